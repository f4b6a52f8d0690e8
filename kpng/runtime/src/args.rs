use crate::feed;
use anyhow::{bail, Context, Result};
use clap::Parser;
use ipnet::IpNet;
use kpng_localsink::{Callback, Pipe, Sink, Strategy};
use kpng_nft::{
    checks::{self, HashBug},
    Config, DryRun, Nft, Proxy,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[clap(name = "kpng-nft", about = "Kubernetes service proxy for nftables")]
pub struct Args {
    #[clap(long, default_value = "kpng=info,warn", env = "KPNG_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    /// Prints the nft scripts instead of applying them.
    #[clap(long)]
    dry_run: bool,

    /// Priority of the nft hooks.
    #[clap(long, default_value = "0", allow_hyphen_values = true)]
    hook_priority: i32,

    /// Leaves comments out of the generated rules.
    #[clap(long)]
    skip_comments: bool,

    /// Prefix length of the IPv4 dispatch shards.
    #[clap(long, default_value = "24")]
    split_bits: u8,

    /// Prefix length of the IPv6 dispatch shards.
    #[clap(long, default_value = "120")]
    split_bits6: u8,

    /// Number of buckets endpoints are accounted into.
    #[clap(long, default_value = "256")]
    maps_count: u64,

    /// Compensates map keys for the nft byte-order bug without probing for
    /// it.
    #[clap(long)]
    force_nft_hash_workaround: bool,

    /// Enables `meta nftrace` in the dispatch chains.
    #[clap(long)]
    trace: bool,

    /// Network CIDRs of pod IPs. Traffic from elsewhere to remote
    /// endpoints is masqueraded.
    #[clap(long, default_value = "0.0.0.0/0")]
    cluster_cidrs: IpNets,

    #[clap(long, default_value = "nft")]
    nft_bin: PathBuf,

    /// Reads ops from this file instead of stdin.
    #[clap(long)]
    input: Option<PathBuf>,

    #[clap(long, default_value = "parallel-send-sequence-close")]
    pipe_strategy: Strategy,
}

#[derive(Clone, Debug)]
struct IpNets(Vec<IpNet>);

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            dry_run,
            hook_priority,
            skip_comments,
            split_bits,
            split_bits6,
            maps_count,
            force_nft_hash_workaround,
            trace,
            cluster_cidrs: IpNets(cluster_cidrs),
            nft_bin,
            input,
            pipe_strategy,
        } = self;

        log_format.try_init(log_level)?;

        let mut config = Config {
            hook_priority,
            comments: !skip_comments,
            split_bits,
            split_bits6,
            maps_count,
            hash_workaround: force_nft_hash_workaround,
            trace,
            cluster_cidrs,
        };
        config.validate().context("invalid configuration")?;

        checks::check_iptables_version().await;

        let nft = Nft::new(nft_bin);
        if !config.hash_workaround
            && !dry_run
            && checks::detect_hash_bug(&nft).await == HashBug::Present
        {
            config.hash_workaround = true;
        }
        info!(
            dry_run,
            hash_workaround = config.hash_workaround,
            strategy = %pipe_strategy,
            "Starting nft proxy"
        );
        debug!(?config);

        let stage: Arc<dyn Callback> = if dry_run {
            Arc::new(Proxy::new(config, DryRun))
        } else {
            Arc::new(Proxy::new(config, nft))
        };
        let mut sink = Sink::new(Pipe::new(pipe_strategy, [stage]));

        let (shutdown_tx, shutdown_rx) = kubert::shutdown::sigint_or_sigterm()?;
        let feed = async {
            match input {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("failed to open {}", path.display()))?;
                    feed::run(file, &mut sink, shutdown_rx.signaled()).await
                }
                None => feed::run(tokio::io::stdin(), &mut sink, shutdown_rx.signaled()).await,
            }
        };

        tokio::select! {
            biased;
            passes = feed => {
                let passes = passes?;
                info!(passes, "Ops feed ended");
            }
            res = shutdown_tx.signaled() => {
                if res.is_err() {
                    bail!("aborted by a second signal");
                }
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for IpNets {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(|n| n.trim().parse().map_err(Into::into))
            .collect::<Result<Vec<IpNet>>>()
            .map(Self)
    }
}
