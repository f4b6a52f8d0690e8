//! Serialization of table changes as nft scripts.

use crate::{Kind, Table};
use kpng_diffstore::{BufferLeaf, Item};
use std::fmt::Write;

/// The scripts of one pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Script {
    /// Creates, updates and flushes objects. Applied as one transaction.
    pub main: String,

    /// Deletes obsolete objects, once `main` has been applied.
    pub deferred: String,
}

struct Object<'a> {
    kind: Kind,
    item: &'a Item<String, BufferLeaf>,
}

// === impl Script ===

impl Script {
    /// Renders the changes of finalized tables.
    ///
    /// A full resync drops and recreates every table. Otherwise only changed
    /// objects are written: updated ones are flushed first, deleted ones are
    /// flushed and then deleted by the deferred script.
    pub fn render<'t>(tables: impl IntoIterator<Item = &'t Table>, full_resync: bool) -> Self {
        let mut script = Self::default();
        for table in tables {
            script.add_table(table, full_resync);
        }
        script
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.deferred.is_empty()
    }

    fn add_table(&mut self, table: &Table, full_resync: bool) {
        let family = table.family();
        let name = table.name();

        let objects = if full_resync {
            let _ = writeln!(self.main, "table {family} {name}");
            let _ = writeln!(self.main, "delete table {family} {name}");
            ordered(table, |_| true)
        } else {
            if !table.has_changes() {
                return;
            }

            let deleted = ordered_deleted(table);
            for obj in &deleted {
                let _ = writeln!(self.main, "flush {} {family} {name} {}", obj.kind, obj.item.key());
            }
            // Referrers go before what they reference.
            for obj in deleted.iter().rev() {
                let _ = writeln!(
                    self.deferred,
                    "delete {} {family} {name} {}",
                    obj.kind,
                    obj.item.key()
                );
            }

            let changed = ordered(table, Item::changed);
            for obj in changed.iter().filter(|obj| !obj.item.created()) {
                let _ = writeln!(self.main, "flush {} {family} {name} {}", obj.kind, obj.item.key());
            }
            changed
        };

        if objects.is_empty() {
            return;
        }

        let _ = writeln!(self.main, "table {family} {name} {{");
        for Object { kind, item } in objects {
            let _ = writeln!(self.main, " {kind} {} {{", item.key());
            self.main.push_str(item.value().as_str());
            self.main.push_str(" }\n");
        }
        self.main.push_str("}\n");
    }
}

/// Written objects matching `filter`, in emission order.
fn ordered<'t>(table: &'t Table, filter: impl Fn(&Item<String, BufferLeaf>) -> bool) -> Vec<Object<'t>> {
    let mut objects = table
        .stores()
        .into_iter()
        .flat_map(|(kind, store)| store.list().map(move |item| Object { kind, item }))
        .filter(|obj| filter(obj.item))
        .collect::<Vec<_>>();
    objects.sort_by(|a, b| emission_key(a).cmp(&emission_key(b)));
    objects
}

fn ordered_deleted(table: &Table) -> Vec<Object<'_>> {
    let mut objects = table
        .stores()
        .into_iter()
        .flat_map(|(kind, store)| {
            store
                .deleted()
                .into_iter()
                .map(move |item| Object { kind, item })
        })
        .collect::<Vec<_>>();
    objects.sort_by(|a, b| emission_key(a).cmp(&emission_key(b)));
    objects
}

fn emission_key<'a>(obj: &Object<'a>) -> (u8, &'a str) {
    (tier(obj.kind, obj.item.key()), obj.item.key())
}

/// Objects may only reference objects of a lower tier, so that everything
/// is declared before it is used:
///
/// 0. affinity sets;
/// 1. endpoint chains (`svc_<ns>_<name>_ep_<ip>`);
/// 2. endpoint vmaps (`svc_<ns>_<name>_eps[_<port>]`);
/// 3. other service objects (`dnat_svc_*`, `filter_svc_*`);
/// 4. shared objects.
pub(crate) fn tier(kind: Kind, name: &str) -> u8 {
    if kind == Kind::Set {
        return 0;
    }
    if let Some(svc) = name.strip_prefix("svc_") {
        if svc.contains("_ep_") {
            return 1;
        }
        if svc.ends_with("_eps") || svc.contains("_eps_") {
            return 2;
        }
        return 3;
    }
    if name.starts_with("dnat_svc_") || name.starts_with("filter_svc_") {
        return 3;
    }
    4
}
