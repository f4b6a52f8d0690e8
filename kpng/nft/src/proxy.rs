use crate::{Apply, Config, Family, PassStats, RenderContext, Script, Table};
use kpng_localsink::{Callback, ServiceEndpoints};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, trace, warn};


/// Compiles every snapshot into the nft tables and applies the changes.
#[derive(Debug)]
pub struct Proxy<A> {
    config: Config,
    apply: A,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    tables: [Table; 2],

    /// The next pass must recreate the tables from scratch: nothing was
    /// applied yet, or the last attempt failed.
    full_resync: bool,
}

/// What a pass did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing changed since the last pass.
    Unchanged,
    Applied(Script),
    Failed,
}

// === impl Proxy ===

impl<A: Apply> Proxy<A> {
    pub fn new(config: Config, apply: A) -> Self {
        Self {
            config,
            apply,
            state: Mutex::new(State {
                tables: [Table::new(Family::Ip), Table::new(Family::Ip6)],
                full_resync: true,
            }),
        }
    }

    pub fn applier(&self) -> &A {
        &self.apply
    }

    pub async fn full_resync(&self) -> bool {
        self.state.lock().await.full_resync
    }

    /// Runs one pass over the services received on `rx`.
    pub async fn run_pass(&self, mut rx: mpsc::Receiver<ServiceEndpoints>) -> Outcome {
        let mut state = self.state.lock().await;
        let State {
            tables: [table4, table6],
            full_resync,
        } = &mut *state;

        table4.reset();
        table6.reset();

        let mut ctx4 = RenderContext::new(table4, &self.config);
        let mut ctx6 = RenderContext::new(table6, &self.config);
        while let Some(seps) = rx.recv().await {
            ctx4.add_service_endpoints(&seps);
            ctx6.add_service_endpoints(&seps);
        }
        let stats4 = ctx4.finalize();
        let stats6 = ctx6.finalize();
        log_stats(&stats4, &stats6);

        if !*full_resync && !table4.has_changes() && !table6.has_changes() {
            debug!("No changes to apply");
            return Outcome::Unchanged;
        }

        let script = Script::render([&*table4, &*table6], *full_resync);
        trace!(script = %script.main, "Applying");

        if let Err(error) = self.apply.apply(&script.main).await {
            error!(%error, "nft failed");
            debug!(script = %script.main, "Failed script");
            if !*full_resync {
                info!("Doing a full resync after nft failure");
                *full_resync = true;
            }
            return Outcome::Failed;
        }

        if !script.deferred.is_empty() {
            debug!("Running deferred nft actions");
            trace!(script = %script.deferred, "Applying deferred");
            if let Err(error) = self.apply.apply(&script.deferred).await {
                warn!(%error, "nft deferred script failed");
            }
        }

        *full_resync = false;
        Outcome::Applied(script)
    }
}

#[async_trait::async_trait]
impl<A: Apply> Callback for Proxy<A> {
    async fn callback(&self, rx: mpsc::Receiver<ServiceEndpoints>) {
        self.run_pass(rx).await;
    }
}

fn log_stats(v4: &PassStats, v6: &PassStats) {
    debug!(
        services = v4.services.max(v6.services),
        endpoints = v4.endpoints + v6.endpoints,
        shards = v4.dispatch_shards + v6.dispatch_shards,
        largest_map_bucket = v4.largest_map_bucket.max(v6.largest_map_bucket),
        elapsed = ?v4.elapsed.max(v6.elapsed),
        "Compiled pass"
    );
}
