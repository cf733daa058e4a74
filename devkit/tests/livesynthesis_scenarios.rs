//! Scénarios de bout en bout : cycle de vie des items -> hooks -> lignes livesynthesis.

use symbion_devkit::{ItemBuilder, TestHarness};
use symbion_livestate::livesynthesis::counters::{Counter, Counters};
use symbion_livestate::livesynthesis::{recompute, recompute_force};
use symbion_livestate::models::{ChangeSet, ItemKind, LsState, StateType};
use symbion_livestate::overall::{resolve_overall_state, OVERALL_ACKNOWLEDGED, OVERALL_DOWNTIMED};
use symbion_livestate::store::{LiveStore, MemoryStore};

fn only(counters: &Counters, expected: &[(Counter, i64)]) {
    for &counter in Counter::ALL {
        let want = expected.iter().find(|(c, _)| *c == counter).map_or(0, |(_, v)| *v);
        assert_eq!(counters.get(counter), want, "{}", counter.field());
    }
}

#[test]
fn test_host_walkthrough() {
    let h = TestHarness::new().unwrap();
    let realm_a = h.add_realm("A", None).unwrap();
    assert!(h.store.find_livesynthesis(&realm_a).unwrap().is_none());

    // 1. insertion : la ligne du realm est créée
    let h1 = h
        .create(ItemBuilder::host("H1").in_realm(&realm_a).hard(LsState::Unreachable))
        .unwrap();
    only(&h.counters(&realm_a).unwrap(), &[(Counter::HostsTotal, 1), (Counter::HostsUnreachableHard, 1)]);
    assert_eq!(h1.overall_state_id, 3);

    // 2. DOWN SOFT : rien ne bouge
    let h1 = h
        .update(ItemKind::Host, &h1.id, ChangeSet::state(LsState::Down, StateType::Soft))
        .unwrap();
    only(&h.counters(&realm_a).unwrap(), &[(Counter::HostsTotal, 1), (Counter::HostsUnreachableHard, 1)]);
    assert_eq!(h1.overall_state_id, 3);

    // 3. DOWN HARD
    let h1 = h
        .update(ItemKind::Host, &h1.id, ChangeSet::state(LsState::Down, StateType::Hard))
        .unwrap();
    only(&h.counters(&realm_a).unwrap(), &[(Counter::HostsTotal, 1), (Counter::HostsDownHard, 1)]);
    assert_eq!(h1.overall_state_id, 4);

    // 4. acquittement sans champ d'état
    let h1 = h.update(ItemKind::Host, &h1.id, ChangeSet::acknowledged(true)).unwrap();
    only(&h.counters(&realm_a).unwrap(), &[(Counter::HostsTotal, 1), (Counter::HostsAcknowledged, 1)]);
    assert_eq!(h1.overall_state_id, 1);

    // 5. fin d'acquittement : retour au bucket d'état
    let h1 = h.update(ItemKind::Host, &h1.id, ChangeSet::acknowledged(false)).unwrap();
    only(&h.counters(&realm_a).unwrap(), &[(Counter::HostsTotal, 1), (Counter::HostsDownHard, 1)]);
    assert_eq!(h1.overall_state_id, 4);

    // 6. service CRITICAL sous H1
    let s1 = h
        .create(ItemBuilder::service("S1", &h1.id).in_realm(&realm_a).hard(LsState::Critical))
        .unwrap();
    assert_eq!(s1.overall_state_id, 4);
    assert_eq!(h.item(ItemKind::Host, &h1.id).unwrap().overall_state_id, 4);
    let counters = h.counters(&realm_a).unwrap();
    assert_eq!(counters.services_total, 1);
    assert_eq!(counters.services_critical_hard, 1);

    h.assert_consistent().unwrap();
}

#[test]
fn test_host_overall_follows_worst_service() {
    let h = TestHarness::new().unwrap();
    let host = h.create(ItemBuilder::host("web").hard(LsState::Up)).unwrap();
    let svc = h.create(ItemBuilder::service("http", &host.id).hard(LsState::Ok)).unwrap();
    assert_eq!(h.item(ItemKind::Host, &host.id).unwrap().overall_state_id, 0);

    h.update(ItemKind::Service, &svc.id, ChangeSet::state(LsState::Critical, StateType::Hard)).unwrap();
    assert_eq!(h.item(ItemKind::Host, &host.id).unwrap().overall_state_id, 4);

    h.update(ItemKind::Service, &svc.id, ChangeSet::downtimed(true)).unwrap();
    assert_eq!(h.item(ItemKind::Host, &host.id).unwrap().overall_state_id, OVERALL_DOWNTIMED);

    h.update(ItemKind::Service, &svc.id, ChangeSet::state(LsState::Ok, StateType::Hard)).unwrap();
    h.update(ItemKind::Service, &svc.id, ChangeSet::downtimed(false)).unwrap();
    assert_eq!(h.item(ItemKind::Host, &host.id).unwrap().overall_state_id, 0);
    h.assert_consistent().unwrap();
}

#[test]
fn test_recompute_is_idempotent() {
    let h = TestHarness::new().unwrap();
    let eu = h.add_realm("Europe", None).unwrap();
    let host = h.create(ItemBuilder::host("web").in_realm(&eu).hard(LsState::Down).acknowledged()).unwrap();
    h.create(ItemBuilder::service("http", &host.id).in_realm(&eu).hard(LsState::Warning).flapping()).unwrap();
    h.create(ItemBuilder::host("db").hard(LsState::Up).unmonitored()).unwrap();

    let store = h.store.as_ref();
    recompute_force(store, None).unwrap();
    let first = store.livesynthesis_rows().unwrap();
    recompute_force(store, None).unwrap();
    assert_eq!(store.livesynthesis_rows().unwrap(), first);

    let report = recompute(store, None).unwrap();
    assert!(report.recounted.is_empty());
    assert_eq!(store.livesynthesis_rows().unwrap(), first);
    h.assert_consistent().unwrap();
}

#[test]
fn test_conservation_across_mixed_updates() {
    let h = TestHarness::new().unwrap();
    let host = h.create(ItemBuilder::host("web").hard(LsState::Up)).unwrap();
    let services: Vec<_> = ["http", "ssh", "disk"]
        .iter()
        .map(|name| h.create(ItemBuilder::service(name, &host.id).hard(LsState::Ok)).unwrap())
        .collect();

    let changes = [
        ChangeSet::state(LsState::Critical, StateType::Hard),
        ChangeSet::acknowledged(true),
        ChangeSet::downtimed(true),
        ChangeSet::state(LsState::Warning, StateType::Soft),
        ChangeSet::acknowledged(false),
        ChangeSet::state(LsState::Unknown, StateType::Hard),
        ChangeSet::downtimed(false),
        ChangeSet { ls_is_flapping: Some(true), ..ChangeSet::default() },
    ];
    for (i, change) in changes.iter().enumerate() {
        let svc = &services[i % services.len()];
        h.update(ItemKind::Service, &svc.id, change.clone()).unwrap();

        let counters = h.counters(&h.root).unwrap();
        for kind in ItemKind::ALL {
            assert!(counters.is_conserved(kind), "step {i}: {kind} not conserved");
            assert!(counters.get(Counter::acknowledged(kind)) <= counters.get(Counter::total(kind)));
            assert!(counters.get(Counter::in_downtime(kind)) <= counters.get(Counter::total(kind)));
        }
    }
    h.assert_consistent().unwrap();
}

#[test]
fn test_incremental_path_converges_with_recompute() {
    let h = TestHarness::new().unwrap();
    let host = h.create(ItemBuilder::host("web")).unwrap();

    let sequence = [
        ChangeSet::state(LsState::Up, StateType::Soft),
        ChangeSet::state(LsState::Up, StateType::Hard),
        ChangeSet::state(LsState::Down, StateType::Soft),
        ChangeSet::acknowledged(true),
        ChangeSet::state(LsState::Down, StateType::Hard),
        ChangeSet::downtimed(true),
        ChangeSet::acknowledged(false),
        ChangeSet { ls_state_type: Some(StateType::Soft), ..ChangeSet::default() },
        ChangeSet { active_checks_enabled: Some(false), passive_checks_enabled: Some(false), ..ChangeSet::default() },
        ChangeSet::downtimed(false),
        ChangeSet::state(LsState::Unreachable, StateType::Hard),
        ChangeSet { ls_output: Some("PING OK".into()), ..ChangeSet::default() },
    ];
    for change in sequence {
        h.update(ItemKind::Host, &host.id, change).unwrap();
        h.assert_consistent().unwrap();
    }

    let incremental = h.counters(&h.root).unwrap();
    recompute_force(h.store.as_ref(), None).unwrap();
    assert_eq!(h.counters(&h.root).unwrap(), incremental);
    assert_eq!(incremental.hosts_unreachable_hard, 1);
    assert_eq!(incremental.hosts_not_monitored, 1);
}

#[test]
fn test_soft_round_trip_leaves_counters_untouched() {
    let h = TestHarness::new().unwrap();
    let host = h.create(ItemBuilder::host("web").hard(LsState::Down)).unwrap();
    let before = h.counters(&h.root).unwrap();

    h.update(ItemKind::Host, &host.id, ChangeSet::state(LsState::Down, StateType::Soft)).unwrap();
    assert_eq!(h.counters(&h.root).unwrap(), before);
    h.update(ItemKind::Host, &host.id, ChangeSet::state(LsState::Down, StateType::Hard)).unwrap();
    assert_eq!(h.counters(&h.root).unwrap(), before);

    // SOFT vers un autre état puis HARD : une seule transition, à la settlement
    h.update(ItemKind::Host, &host.id, ChangeSet::state(LsState::Up, StateType::Soft)).unwrap();
    assert_eq!(h.counters(&h.root).unwrap(), before);
    h.update(ItemKind::Host, &host.id, ChangeSet::state(LsState::Up, StateType::Hard)).unwrap();
    let after = h.counters(&h.root).unwrap();
    assert_eq!(after.hosts_down_hard, 0);
    assert_eq!(after.hosts_up_hard, 1);
    h.assert_consistent().unwrap();
}

#[test]
fn test_templates_are_ignored() {
    let h = TestHarness::new().unwrap();
    h.create(ItemBuilder::host("generic-host").template().hard(LsState::Down)).unwrap();
    let host = h.create(ItemBuilder::host("web").hard(LsState::Up)).unwrap();
    let tpl = h
        .create(ItemBuilder::service("generic-service", &host.id).template().hard(LsState::Critical))
        .unwrap();
    h.update(ItemKind::Service, &tpl.id, ChangeSet::acknowledged(true)).unwrap();

    only(&h.counters(&h.root).unwrap(), &[(Counter::HostsTotal, 1), (Counter::HostsUpHard, 1)]);
    assert_eq!(h.item(ItemKind::Host, &host.id).unwrap().overall_state_id, 0);
    h.assert_consistent().unwrap();
}

#[test]
fn test_missing_row_triggers_bootstrap_on_update() {
    let h = TestHarness::new().unwrap();
    let host = h.create(ItemBuilder::host("web").hard(LsState::Up)).unwrap();

    // ligne perdue (restauration partielle, purge manuelle...) : le prochain update la reconstruit
    let store = MemoryStore::new();
    let root = store.insert_realm("All", None).unwrap().id;
    let mut orphan = h.item(ItemKind::Host, &host.id).unwrap();
    orphan.realm = root.clone();
    store.insert_item(orphan).unwrap();
    let h = TestHarness::with_store(store).unwrap();
    assert!(h.store.find_livesynthesis(&root).unwrap().is_none());

    h.update(ItemKind::Host, &host.id, ChangeSet::state(LsState::Down, StateType::Hard)).unwrap();
    only(&h.counters(&root).unwrap(), &[(Counter::HostsTotal, 1), (Counter::HostsDownHard, 1)]);
    h.assert_consistent().unwrap();
}

#[test]
fn test_persistent_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("livestate.json");

    let host_id = {
        let h = TestHarness::with_store(MemoryStore::open(&path).unwrap()).unwrap();
        let host = h.create(ItemBuilder::host("web").hard(LsState::Down).acknowledged()).unwrap();
        host.id
    };

    let h = TestHarness::with_store(MemoryStore::open(&path).unwrap()).unwrap();
    assert_eq!(h.item(ItemKind::Host, &host_id).unwrap().overall_state_id, OVERALL_ACKNOWLEDGED);
    assert_eq!(h.counters(&h.root).unwrap().hosts_acknowledged, 1);
    assert!(recompute(h.store.as_ref(), None).unwrap().recounted.is_empty());
    h.assert_consistent().unwrap();
}

#[test]
fn test_overall_ordinal_laws() {
    for (kind, good, soft, hard) in [
        (ItemKind::Host, LsState::Up, LsState::Unreachable, LsState::Down),
        (ItemKind::Service, LsState::Ok, LsState::Warning, LsState::Critical),
    ] {
        for (ack, downtime) in [(false, false), (true, false), (false, true), (true, true)] {
            assert_eq!(resolve_overall_state(kind, good, ack, downtime, None).unwrap(), 0);
        }
        assert_eq!(resolve_overall_state(kind, soft, false, false, None).unwrap(), 3);
        assert_eq!(resolve_overall_state(kind, hard, false, false, None).unwrap(), 4);
        assert_eq!(resolve_overall_state(kind, hard, true, false, None).unwrap(), 1);
        assert_eq!(resolve_overall_state(kind, hard, false, true, None).unwrap(), 2);
    }
}
