use std::sync::Arc;
use std::thread;

use vram_mgr::utils::bytes_to_pages;
use vram_mgr::{Placement, RangeManager, SpanState, VramConfig, VramError, VramManager};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

#[test]
fn gigabyte_scenario() {
    // 1 GiB of VRAM, 256 MiB visible, scattered 512 MiB request bottom-up.
    let mgr = VramManager::new(VramConfig::new(GIB, 256 * MIB));
    let pages = bytes_to_pages(512 * MIB);

    let alloc = mgr
        .alloc(pages, &Placement::new())
        .expect("hard failure on an empty space")
        .expect("soft failure on an empty space");

    let total: u64 = alloc.extents().iter().map(|e| e.size).sum();
    assert_eq!(total, pages);
    assert_eq!(mgr.usage(), 512 * MIB);

    // An empty bottom-up space fills [0, 512 MiB) front to back, so exactly
    // the visible window's worth overlaps [0, 256 MiB).
    assert_eq!(mgr.visible_size(&alloc), 256 * MIB);
    assert_eq!(mgr.vis_usage(), 256 * MIB);

    mgr.free(alloc).unwrap();
    assert_eq!(mgr.usage(), 0);
    assert_eq!(mgr.vis_usage(), 0);
    mgr.fini().unwrap();
}

#[test]
fn oversized_request_is_soft() {
    let mgr = VramManager::new(VramConfig::new(GIB, 256 * MIB));
    let got = mgr.alloc(bytes_to_pages(2 * GIB), &Placement::new()).unwrap();
    assert!(got.is_none());
    assert_eq!(mgr.usage(), 0);
    assert_eq!(mgr.vis_usage(), 0);
    mgr.fini().unwrap();
}

#[test]
fn concurrent_requests_never_double_book() {
    // Two concurrent 600 MiB scattered requests against 1 GiB: at most one
    // can succeed, and no extent may appear in both results.
    let mgr = Arc::new(VramManager::new(VramConfig::new(GIB, 256 * MIB)));
    let pages = bytes_to_pages(600 * MIB);

    let mut handles = Vec::new();
    for _ in 0..2 {
        let mgr = Arc::clone(&mgr);
        handles.push(thread::spawn(move || {
            mgr.alloc(pages, &Placement::new())
        }));
    }

    let mut results = Vec::new();
    for h in handles {
        results.push(h.join().unwrap());
    }

    let mut won: Vec<_> = Vec::new();
    for r in results {
        match r {
            Ok(Some(alloc)) => won.push(alloc),
            // Soft-fail is the expected loser outcome; a hard failure would
            // mean the pre-check raced in a way the rollback did not cover.
            Ok(None) => {}
            Err(e) => panic!("unexpected hard failure: {e}"),
        }
    }
    assert!(won.len() <= 1, "1 GiB cannot hold two 600 MiB allocations");

    let mut starts: Vec<u64> = won
        .iter()
        .flat_map(|a| a.extents().iter().map(|e| e.start))
        .collect();
    starts.sort_unstable();
    starts.dedup();
    let extent_count: usize = won.iter().map(|a| a.extents().len()).sum();
    assert_eq!(starts.len(), extent_count, "extent double-booked");

    for alloc in won {
        mgr.free(alloc).unwrap();
    }
    assert_eq!(mgr.usage(), 0);
    Arc::try_unwrap(mgr).unwrap().fini().unwrap();
}

#[test]
fn mixed_workload_conserves_accounting() {
    let mgr = VramManager::new(VramConfig::new(256 * MIB, 64 * MIB));
    let mut live = Vec::new();

    let shapes = [
        (8 * MIB, Placement::new()),
        (2 * MIB, Placement::new().contiguous()),
        (16 * MIB, Placement::new().top_down()),
        (4 * MIB, Placement::new().contiguous().top_down()),
        (32 * MIB, Placement::new()),
        (MIB, Placement::new().range(0, bytes_to_pages(64 * MIB))),
    ];

    for (bytes, place) in shapes {
        let alloc = mgr.alloc(bytes_to_pages(bytes), &place).unwrap().unwrap();
        if place.contiguous {
            assert_eq!(alloc.extents().len(), 1);
        }
        live.push(alloc);
    }

    let expected_usage: u64 = live.iter().map(|a| a.size()).sum();
    let expected_vis: u64 = live.iter().map(|a| mgr.visible_size(a)).sum();
    assert_eq!(mgr.usage(), expected_usage);
    assert_eq!(mgr.vis_usage(), expected_vis);
    assert!(mgr.vis_usage() <= mgr.usage());

    // Free every other allocation and re-check conservation.
    let mut kept = Vec::new();
    for (i, alloc) in live.into_iter().enumerate() {
        if i % 2 == 0 {
            mgr.free(alloc).unwrap();
        } else {
            kept.push(alloc);
        }
    }
    let expected_usage: u64 = kept.iter().map(|a| a.size()).sum();
    let expected_vis: u64 = kept.iter().map(|a| mgr.visible_size(a)).sum();
    assert_eq!(mgr.usage(), expected_usage);
    assert_eq!(mgr.vis_usage(), expected_vis);

    for alloc in kept {
        mgr.free(alloc).unwrap();
    }
    mgr.fini().unwrap();
}

#[test]
fn introspection_shows_no_overlap() {
    let mgr = VramManager::new(VramConfig::new(128 * MIB, 128 * MIB));
    let a = mgr.alloc(bytes_to_pages(10 * MIB), &Placement::new()).unwrap().unwrap();
    let b = mgr
        .alloc(bytes_to_pages(6 * MIB), &Placement::new().top_down())
        .unwrap()
        .unwrap();
    let c = mgr
        .alloc(bytes_to_pages(3 * MIB), &Placement::new().contiguous())
        .unwrap()
        .unwrap();

    // The debug dump walks the same spans; parse-free check via the dump's
    // address-ordered, gap-free format is covered in unit tests. Here, free
    // one allocation and make sure the dump still renders.
    let mut dump = String::new();
    mgr.debug(&mut dump).unwrap();
    assert!(dump.contains("used"));
    assert!(dump.contains("free"));
    assert!(dump.lines().last().unwrap().starts_with("man size:"));

    mgr.free(b).unwrap();
    mgr.free(a).unwrap();
    mgr.free(c).unwrap();

    let mut dump = String::new();
    mgr.debug(&mut dump).unwrap();
    // Everything coalesced back into one free span plus the totals line.
    assert_eq!(dump.lines().count(), 2);
    mgr.fini().unwrap();
}

#[test]
fn placement_manager_contract() {
    // Drive the allocator only through the external trait, the way the
    // placement framework does.
    fn churn<M: RangeManager>(m: &M) {
        let a = m
            .get_node(bytes_to_pages(4 * MIB), &Placement::new().contiguous())
            .unwrap()
            .unwrap();
        assert_eq!(m.usage(), 4 * MIB);
        assert!(m.vis_usage() <= m.usage());
        m.put_node(a).unwrap();
        assert_eq!(m.usage(), 0);
    }

    let mgr = VramManager::new(VramConfig::new(64 * MIB, 16 * MIB));
    churn(&mgr);
    mgr.fini().unwrap();
}

#[test]
fn fini_with_leak_reports_busy() {
    let mgr = VramManager::new(VramConfig::new(64 * MIB, 64 * MIB));
    let a = mgr.alloc(bytes_to_pages(MIB), &Placement::new()).unwrap().unwrap();
    let live = a.extents().len();
    match mgr.fini() {
        Err(VramError::Busy { live_extents }) => assert_eq!(live_extents, live),
        other => panic!("expected Busy, got {other:?}"),
    }
}

#[test]
fn span_state_is_exported_for_introspection() {
    // The mm layer's span view is part of the public surface so embedders
    // can run their own overlap checks.
    let mut mm = vram_mgr::RangeSpace::new(1024);
    let e = mm
        .insert_in_range(100, 1, 0, 0, vram_mgr::InsertMode::BestFit)
        .unwrap();
    let spans = mm.spans();
    assert_eq!(spans[0].1, SpanState::Used);
    assert_eq!(spans[1].1, SpanState::Free);
    mm.remove(&e);
}
