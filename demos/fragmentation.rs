use vram_mgr::utils::bytes_to_pages;
use vram_mgr::{Placement, VramConfig, VramManager};

const MIB: u64 = 1024 * 1024;

fn main() {
    env_logger::init();

    println!("============================================================");
    println!("         VRAM Range Manager - Fragmentation Showcase        ");
    println!("============================================================");

    let mgr = VramManager::new(VramConfig::new(64 * MIB, 16 * MIB));

    // Checkerboard the space with 2 MiB buffers, then free every other one.
    println!("[+] Checkerboarding 64 MB with 2 MB buffers...");
    let mut board = Vec::new();
    loop {
        match mgr.alloc(bytes_to_pages(2 * MIB), &Placement::new().contiguous()) {
            Ok(Some(alloc)) => board.push(alloc),
            Ok(None) => break,
            Err(e) => {
                println!("    unexpected failure: {e}");
                break;
            }
        }
    }
    println!("    placed {} buffers", board.len());

    let mut freed = 0;
    for (i, alloc) in board.drain(..).collect::<Vec<_>>().into_iter().enumerate() {
        if i % 2 == 1 {
            mgr.free(alloc).expect("free failed");
            freed += 1;
        } else {
            board.push(alloc);
        }
    }
    println!("    freed every other buffer ({freed} holes of 2 MB)");
    println!("    VRAM Used: {} MB", mgr.usage() / MIB);

    // Plenty of free bytes, but no contiguous run: the contiguous request
    // hard-fails while the scattered one still succeeds.
    println!("\n[+] Requesting 16 MB contiguous...");
    match mgr.alloc(bytes_to_pages(16 * MIB), &Placement::new().contiguous()) {
        Ok(Some(_)) => println!("    unexpectedly succeeded"),
        Ok(None) => println!("    soft no-space (capacity pre-check)"),
        Err(e) => println!("    hard failure as expected: {e} (errno {})", e.errno()),
    }

    println!("\n[+] Requesting 16 MB scattered...");
    match mgr.alloc(bytes_to_pages(16 * MIB), &Placement::new()) {
        Ok(Some(alloc)) => {
            println!(
                "    satisfied with {} extents, visible {} MB",
                alloc.extents().len(),
                mgr.visible_size(&alloc) / MIB
            );
            mgr.free(alloc).expect("free failed");
        }
        Ok(None) => println!("    soft no-space"),
        Err(e) => println!("    failed: {e}"),
    }

    for alloc in board {
        mgr.free(alloc).expect("free failed");
    }
    mgr.fini().expect("teardown failed");
    println!("\n[+] Done.");
}
