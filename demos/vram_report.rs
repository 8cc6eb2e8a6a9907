use vram_mgr::utils::bytes_to_pages;
use vram_mgr::{Placement, VramConfig, VramManager};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

fn main() {
    env_logger::init();

    println!("============================================================");
    println!("              VRAM Range Manager - Usage Report             ");
    println!("============================================================");

    // 1 GiB device with a 256 MiB host-visible window.
    let mgr = VramManager::new(VramConfig::new(GIB, 256 * MIB));
    println!("[+] Manager initialized");
    println!("    VRAM Total:    {} MB", mgr.total_size() / MIB);
    println!("    Visible Total: {} MB", mgr.visible_total() / MIB);

    // A mixed set of buffers the way a driver would place them.
    println!("\n[+] Allocating buffers...");
    let mut live = Vec::new();
    let requests = [
        ("framebuffer (contiguous, low)", 32 * MIB, Placement::new().contiguous()),
        ("texture pool (scattered)", 512 * MIB, Placement::new()),
        ("firmware region (top-down)", 8 * MIB, Placement::new().contiguous().top_down()),
        ("staging (scattered, top-down)", 64 * MIB, Placement::new().top_down()),
    ];

    for (name, bytes, place) in requests {
        match mgr.alloc(bytes_to_pages(bytes), &place) {
            Ok(Some(alloc)) => {
                println!(
                    "    {:<32} {:>5} MB in {:>4} extent(s), visible {:>4} MB",
                    name,
                    alloc.size() / MIB,
                    alloc.extents().len(),
                    mgr.visible_size(&alloc) / MIB
                );
                live.push(alloc);
            }
            Ok(None) => println!("    {name:<32} deferred: not enough VRAM"),
            Err(e) => println!("    {name:<32} failed: {e}"),
        }
    }

    println!("\n[+] Counters");
    println!("    VRAM Used:         {} MB", mgr.usage() / MIB);
    println!("    Visible VRAM Used: {} MB", mgr.vis_usage() / MIB);

    println!("\n[+] Range space dump");
    let mut dump = String::new();
    mgr.debug(&mut dump).expect("dump failed");
    print!("{dump}");

    println!("\n[+] Freeing everything...");
    for alloc in live {
        mgr.free(alloc).expect("free failed");
    }
    println!("    VRAM Used:         {} MB", mgr.usage() / MIB);

    match mgr.fini() {
        Ok(()) => println!("\n[+] Manager torn down cleanly."),
        Err(e) => println!("\n[-] Teardown failed: {e}"),
    }
}
