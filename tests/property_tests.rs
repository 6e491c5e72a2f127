mod common;

use blockwatch::source::World;
use blockwatch::{BodyId, Level, LinkKind};
use common::{Fixture, armor, refinery, refinery_group};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};

const BODIES: u64 = 6;

#[derive(Debug, Clone, Copy)]
struct Toggle {
    a: u64,
    b: u64,
    kind: LinkKind,
}

fn toggle_strategy() -> impl Strategy<Value = Toggle> {
    (1..=BODIES, 1..=BODIES, prop::bool::ANY)
        .prop_filter("distinct bodies", |(a, b, _)| a != b)
        .prop_map(|(a, b, hard)| Toggle {
            a,
            b,
            kind: if hard { LinkKind::Hard } else { LinkKind::Soft },
        })
}

fn find(parent: &mut BTreeMap<u64, u64>, x: u64) -> u64 {
    let p = parent[&x];
    if p == x {
        return x;
    }
    let root = find(parent, p);
    parent.insert(x, root);
    root
}

/// Expected body partition at `level` from the live links
fn expected_partition(links: &HashSet<(u64, u64, LinkKind)>, level: Level) -> BTreeSet<Vec<BodyId>> {
    let mut parent: BTreeMap<u64, u64> = (1..=BODIES).map(|b| (b, b)).collect();
    for (a, b, kind) in links {
        if level == Level::Construct && *kind == LinkKind::Hard {
            continue;
        }
        let (ra, rb) = (find(&mut parent, *a), find(&mut parent, *b));
        parent.insert(ra, rb);
    }
    let mut groups: BTreeMap<u64, Vec<BodyId>> = BTreeMap::new();
    for body in 1..=BODIES {
        let root = find(&mut parent, body);
        groups.entry(root).or_default().push(BodyId(body));
    }
    groups.into_values().collect()
}

fn actual_partition(fx: &Fixture, level: Level) -> BTreeSet<Vec<BodyId>> {
    fx.shape()
        .into_iter()
        .filter(|(l, _)| *l == level)
        .map(|(_, bodies)| bodies)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_counts_and_partitions_follow_links(
        refineries in prop::collection::vec(0usize..4, BODIES as usize),
        toggles in prop::collection::vec(toggle_strategy(), 1..40),
    ) {
        let world = World::new();
        for (index, count) in refineries.iter().enumerate() {
            let body = index as u64 + 1;
            let mut units = vec![refinery(body); *count];
            units.push(armor(body));
            world.add_body(BodyId(body), None, units);
        }
        let mut construct = refinery_group(Level::Construct, 0);
        construct.name = "Construct".to_string();
        let mut cluster = refinery_group(Level::Cluster, 0);
        cluster.name = "Cluster".to_string();
        let mut fx = Fixture::start(world, vec![construct, cluster]);

        let expected_total: usize = refineries.iter().sum();
        let mut links = HashSet::new();

        for toggle in toggles {
            let key = (toggle.a.min(toggle.b), toggle.a.max(toggle.b), toggle.kind);
            if links.remove(&key) {
                fx.unlink(toggle.a, toggle.b, toggle.kind);
            } else {
                links.insert(key);
                fx.link(toggle.a, toggle.b, toggle.kind);
            }

            prop_assert_eq!(fx.total("Construct/refineries"), expected_total);
            prop_assert_eq!(fx.total("Cluster/refineries"), expected_total);
            prop_assert!(fx.manager.validate().is_ok());
        }

        prop_assert_eq!(
            actual_partition(&fx, Level::Construct),
            expected_partition(&links, Level::Construct)
        );
        prop_assert_eq!(
            actual_partition(&fx, Level::Cluster),
            expected_partition(&links, Level::Cluster)
        );
    }

    #[test]
    fn prop_link_then_unlink_is_identity(
        setup in prop::collection::vec(toggle_strategy(), 0..10),
        toggle in toggle_strategy(),
    ) {
        let world = World::new();
        for body in 1..=BODIES {
            world.add_body(BodyId(body), None, vec![refinery(body)]);
        }
        let mut fx = Fixture::start(world, vec![refinery_group(Level::Construct, 0)]);
        for toggle in setup {
            fx.link(toggle.a, toggle.b, toggle.kind);
        }

        let before = fx.shape();
        fx.link(toggle.a, toggle.b, toggle.kind);
        fx.unlink(toggle.a, toggle.b, toggle.kind);
        prop_assert_eq!(fx.shape(), before);
        prop_assert_eq!(fx.total("Industry/refineries"), BODIES as usize);
    }
}
