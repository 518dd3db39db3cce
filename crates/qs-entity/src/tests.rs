//! Unit tests for qs-entity.

#[cfg(test)]
fn pool_with(ceiling: u64) -> crate::ClientPool {
    use std::sync::Arc;

    use crate::{ClientPool, ClientRecording, ClientType};

    let types: Arc<[ClientType]> =
        vec![ClientType::new("A").with_costs(2.0, 0.0, 1.0), ClientType::new("B")].into();
    let stations: Arc<[String]> = vec!["Source".to_string(), "Desk".to_string(), "Exit".to_string()].into();
    ClientPool::new(types, stations, ClientRecording { paths: true, station_totals: true }, ceiling)
}

#[cfg(test)]
mod pool {
    use qs_core::{ClientTypeId, SimTime, StationId};
    use qs_stats::Statistics;

    use super::pool_with;
    use crate::{
        CLIENT_CACHE_SIZE, ClientTimes, EntityError, MAX_CLIENTS_ANIMATION, MAX_CLIENTS_MULTI_CORE,
        client_ceiling,
    };

    #[test]
    fn acquire_and_dispose_track_live_count() {
        let mut pool = pool_with(100);
        let mut stats = Statistics::default();
        let a = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        let b = pool.acquire(ClientTypeId(1), false, SimTime::ZERO, &mut stats).unwrap();
        assert_ne!(a.number, b.number);
        assert_eq!(pool.live(), 2);
        assert_eq!(pool.live_of_type(ClientTypeId(0)), 1);
        assert_eq!(stats.clients_in_system.current(), 2);

        pool.dispose_without_statistics(a, SimTime(1_000), &mut stats);
        assert_eq!(pool.live(), 1);
        assert_eq!(pool.free_len(), 1);
        assert_eq!(stats.clients_in_system.current(), 1);
        assert_eq!(pool.live_of_type(ClientTypeId(0)), 0);
        drop(b);
    }

    #[test]
    fn reused_client_is_reset() {
        let mut pool = pool_with(100);
        let mut stats = Statistics::default();
        let mut a = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        a.set_user_data(3, 1.5);
        a.set_user_text("Color", "red");
        a.enter_logic(true);
        a.last_station = StationId(2);
        a.times.waiting_ms = 500;
        let old_number = a.number;
        pool.dispose_without_statistics(a, SimTime::ZERO, &mut stats);

        let b = pool.acquire(ClientTypeId(1), true, SimTime::ZERO, &mut stats).unwrap();
        assert_ne!(b.number, old_number);
        assert_eq!(b.client_type, ClientTypeId(1));
        assert!(b.is_warm_up);
        assert_eq!(b.user_data(3), 0.0);
        assert_eq!(b.user_text("color"), "");
        assert!(!b.test_logic());
        assert_eq!(b.last_station, StationId::INVALID);
        assert_eq!(b.times, ClientTimes::default());
    }

    #[test]
    fn ceiling_is_enforced() {
        let mut pool = pool_with(2);
        let mut stats = Statistics::default();
        let _a = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        let _b = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        let err = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap_err();
        assert!(matches!(err, EntityError::CeilingExceeded { ceiling: 2 }));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let err = pool.acquire(ClientTypeId(9), false, SimTime::ZERO, &mut stats).unwrap_err();
        assert!(matches!(err, EntityError::UnknownClientType(ClientTypeId(9))));
    }

    #[test]
    fn ceiling_rules() {
        assert_eq!(client_ceiling(1, false, None), 6_000_000);
        assert_eq!(client_ceiling(64, false, None), MAX_CLIENTS_MULTI_CORE);
        assert_eq!(client_ceiling(8, true, None), MAX_CLIENTS_ANIMATION);
        assert_eq!(client_ceiling(8, false, Some(7)), 7);
    }

    #[test]
    fn free_list_is_bounded() {
        let mut pool = pool_with(u64::MAX);
        let mut stats = Statistics::default();
        let clients: Vec<_> = (0..CLIENT_CACHE_SIZE + 10)
            .map(|_| pool.acquire(ClientTypeId(0), true, SimTime::ZERO, &mut stats).unwrap())
            .collect();
        for c in clients {
            pool.dispose_without_statistics(c, SimTime::ZERO, &mut stats);
        }
        assert_eq!(pool.free_len(), CLIENT_CACHE_SIZE);
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn warm_up_changes_keep_the_count_current() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let _a = pool.acquire(ClientTypeId(0), true, SimTime(1_000), &mut stats).unwrap();
        let _b = pool.acquire(ClientTypeId(0), true, SimTime(2_000), &mut stats).unwrap();
        let c = pool.acquire(ClientTypeId(1), true, SimTime(3_000), &mut stats).unwrap();
        pool.dispose_without_statistics(c, SimTime(4_000), &mut stats);
        assert_eq!(stats.clients_in_system.current(), 2);

        // End of warm-up: the time indicators restart with two clients inside.
        stats.reset_at(SimTime(5_000));
        assert_eq!(stats.clients_in_system.time_sum(), 0.0);
        pool.finalize_clients_in_system(false, SimTime(15_000), &mut stats);
        assert_eq!(stats.clients_in_system.time_sum(), 10.0);
        assert_eq!(stats.clients_in_system.time_mean(), 2.0);
        assert_eq!(stats.clients_in_system_by_type.by_name("A").map(|i| i.time_mean()), Some(2.0));
        assert_eq!(stats.clients_in_system_by_type.by_name("B").map(|i| i.time_mean()), Some(0.0));
    }

    #[test]
    fn change_type_moves_counters() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let mut a = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        pool.change_type(&mut a, ClientTypeId(1), StationId(1), SimTime(1), &mut stats)
            .unwrap();
        assert_eq!(a.type_last, ClientTypeId(0));
        assert_eq!(a.source_station, StationId(1));
        assert_eq!(pool.live_of_type(ClientTypeId(0)), 0);
        assert_eq!(pool.live_of_type(ClientTypeId(1)), 1);
    }

    #[test]
    fn clone_copies_state_but_not_identity() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let mut a = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        a.times.process_ms = 4_000;
        a.set_user_data(1, 9.0);
        a.last_station = StationId(1);
        a.is_last_client = true;
        a.enter_section(StationId(2));
        let member = pool.acquire(ClientTypeId(1), false, SimTime::ZERO, &mut stats).unwrap();
        a.add_to_batch(member);

        let c = pool.clone_of(&a, false, SimTime::ZERO, &mut stats).unwrap();
        assert_ne!(c.number, a.number);
        assert_eq!(c.times.process_ms, 4_000);
        assert_eq!(c.user_data(1), 9.0);
        assert_eq!(c.last_station, StationId::INVALID);
        assert!(!c.is_last_client);
        assert!(c.sections().is_empty());
        let members = c.batch_members().unwrap();
        assert_eq!(members.len(), 1);
        assert!(members[0].batched);
        assert_eq!(pool.live(), 4);
    }

    #[test]
    fn disposing_an_undissolved_batch_releases_members() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let mut parent = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        for _ in 0..3 {
            let m = pool.acquire(ClientTypeId(1), false, SimTime::ZERO, &mut stats).unwrap();
            parent.add_to_batch(m);
        }
        assert_eq!(pool.live(), 4);
        pool.dispose_without_statistics(parent, SimTime::ZERO, &mut stats);
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn log_client_data_records_times_costs_and_path() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let mut a = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        a.add_station_time(
            StationId(1),
            ClientTimes { waiting_ms: 3_000, transfer_ms: 0, process_ms: 2_000, residence_ms: 5_000 },
            true,
        );
        a.process_costs = 0.5;
        a.set_user_data(2, 7.0);
        a.record_path_step(StationId(0));
        a.record_path_step(StationId(1));

        pool.log_client_data(&a, SimTime(5_000), &mut stats);
        assert_eq!(stats.waiting_all.mean(), 3.0);
        assert_eq!(stats.client_residence.by_name("A").map(|d| d.mean()), Some(5.0));
        assert_eq!(stats.client_costs_waiting.by_name("A").map(|v| v.value()), Some(6.0));
        assert_eq!(stats.client_costs_process.by_name("A").map(|v| v.value()), Some(2.5));
        assert!(stats.client_costs_transfer.by_name("A").is_none());
        assert_eq!(stats.client_data.by_name("2").map(|d| d.mean()), Some(7.0));
        assert_eq!(stats.client_paths.by_name("Source -> Desk").map(|c| c.count()), Some(1));
        assert_eq!(stats.station_waiting.by_name("Desk").map(|d| d.mean()), Some(3.0));

        // Inter-departure time only from the second departure on.
        assert!(stats.client_leave_inter.by_name("A").is_none());
        pool.log_client_data(&a, SimTime(8_000), &mut stats);
        assert_eq!(stats.client_leave_inter.by_name("A").map(|d| d.mean()), Some(3.0));
    }

    #[test]
    fn confidence_tick_every_interval() {
        let mut pool = pool_with(10);
        let hits = (0..1_500).filter(|_| pool.confidence_tick()).count();
        assert_eq!(hits, 3);
    }
}

#[cfg(test)]
mod client {
    use qs_core::{ClientTypeId, SimTime, StationId};
    use qs_stats::Statistics;

    use super::pool_with;
    use crate::{ClientTimes, MAX_USER_DATA_INDEX};

    #[test]
    fn user_data_bounds() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let mut c = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        c.set_user_data(MAX_USER_DATA_INDEX + 1, 1.0);
        assert_eq!(c.user_data(MAX_USER_DATA_INDEX + 1), 0.0);
        c.set_user_data(5, 2.0);
        assert_eq!(c.user_data_in_use().collect::<Vec<_>>(), vec![(5, 2.0)]);
    }

    #[test]
    fn user_text_is_case_insensitive() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let mut c = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        c.set_user_text("Order", "x1");
        assert_eq!(c.user_text("ORDER"), "x1");
        c.set_user_text("order", "x2");
        assert_eq!(c.user_text("Order"), "x2");
        assert_eq!(c.user_text_keys().count(), 1);
    }

    #[test]
    fn dissolve_batch_is_single_use() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let mut parent = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        let mut m1 = pool.acquire(ClientTypeId(1), false, SimTime::ZERO, &mut stats).unwrap();
        m1.times.waiting_ms = 1_000;
        parent.add_to_batch(m1);
        let m2 = pool.acquire(ClientTypeId(1), false, SimTime::ZERO, &mut stats).unwrap();
        parent.add_to_batch(m2);

        parent.times = ClientTimes { waiting_ms: 2_000, transfer_ms: 1, process_ms: 3, residence_ms: 4 };
        parent.waiting_costs = 1.5;
        parent.last_alternative = 2;
        parent.last_station = StationId(1);
        parent.next_station = StationId(2);
        parent.sequence_nr = Some(4);
        parent.record_path_step(StationId(0));

        let members = parent.dissolve_batch().unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].times.waiting_ms, 3_000);
        assert_eq!(members[1].times.waiting_ms, 2_000);
        for m in &members {
            assert!(!m.batched);
            assert_eq!(m.waiting_costs, 1.5);
            assert_eq!(m.last_alternative, 2);
            assert_eq!(m.next_station, StationId(2));
            assert_eq!(m.sequence_nr, Some(4));
            assert_eq!(m.path(), &[StationId(0)]);
        }
        assert!(parent.dissolve_batch().is_none());
        assert!(parent.batch_members().is_none());
    }

    #[test]
    fn batch_restarts_after_dissolve() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let mut parent = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        let m = pool.acquire(ClientTypeId(1), false, SimTime::ZERO, &mut stats).unwrap();
        parent.add_to_batch(m);
        let _ = parent.dissolve_batch();
        let m = pool.acquire(ClientTypeId(1), false, SimTime::ZERO, &mut stats).unwrap();
        parent.add_to_batch(m);
        assert_eq!(parent.batch_members().map(|b| b.len()), Some(1));
    }

    #[test]
    fn sections_snapshot_times() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let mut c = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        c.times.waiting_ms = 100;
        c.enter_section(StationId(5));
        c.times.waiting_ms = 400;
        let entry = c.leave_section(StationId(5)).unwrap();
        assert_eq!(c.times.since(&entry.times).waiting_ms, 300);
        assert!(c.leave_section(StationId(5)).is_none());
    }

    #[test]
    fn logic_stack() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let mut c = pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap();
        assert!(!c.test_logic());
        c.enter_logic(false);
        c.enter_logic(false);
        c.update_logic();
        assert!(c.test_logic());
        c.leave_logic();
        assert!(!c.test_logic());
        c.leave_all_logic();
        assert_eq!(c.logic_depth(), 0);
    }

    #[test]
    fn warm_up_clients_record_no_path() {
        let mut pool = pool_with(10);
        let mut stats = Statistics::default();
        let mut c = pool.acquire(ClientTypeId(0), true, SimTime::ZERO, &mut stats).unwrap();
        c.record_path_step(StationId(1));
        assert!(c.path().is_empty());
    }
}

#[cfg(test)]
mod props {
    use proptest::prelude::*;
    use qs_core::{ClientTypeId, SimTime};
    use qs_stats::Statistics;

    use super::pool_with;

    proptest! {
        // `true` acquires, `false` disposes the oldest live client.
        #[test]
        fn live_count_matches_operations(ops in proptest::collection::vec(any::<bool>(), 0..300)) {
            let mut pool = pool_with(u64::MAX);
            let mut stats = Statistics::default();
            let mut held = Vec::new();
            for acquire in ops {
                if acquire {
                    held.push(pool.acquire(ClientTypeId(0), false, SimTime::ZERO, &mut stats).unwrap());
                } else if !held.is_empty() {
                    let c = held.remove(0);
                    pool.dispose_without_statistics(c, SimTime::ZERO, &mut stats);
                }
                prop_assert_eq!(pool.live(), pool.acquired() - pool.disposed());
                prop_assert_eq!(pool.live() as usize, held.len());
            }
            let mut numbers: Vec<u64> = held.iter().map(|c| c.number).collect();
            numbers.sort_unstable();
            numbers.dedup();
            prop_assert_eq!(numbers.len(), held.len());
        }
    }
}
