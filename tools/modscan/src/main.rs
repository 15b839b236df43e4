//! Inspect, validate and checksum-patch module firmware images.
//!
//! ```text
//! modscan info   <image> [load_address]
//! modscan verify <image> [load_address]
//! modscan patch  <in> <out> [load_address]
//! ```
//!
//! The load address (hex, default 0) is where the start of the image file
//! lives in the device address space; it translates the block's table
//! addresses into file offsets.

use std::fmt::Write as _;
use std::{env, fs, process};

use modblock_abi::checksum::image_checksum;
use modblock_abi::scan::{BlockError, BlockView};
use runtime_startup::{RESERVED_IRQ_SLOTS, RESERVED_SYSTEM_SLOTS, VECTOR_COUNT};

/// Vector slots are target-address sized in the image.
const SLOT_SIZE: usize = 4;

fn main() -> std::io::Result<()> {
    // args: <info|verify|patch> <image> [out] [load_address]
    let mut args = env::args().skip(1);
    let mode = args.next().expect("mode: info | verify | patch");

    match mode.as_str() {
        "info" => {
            let image = fs::read(args.next().expect("image path"))?;
            let load = parse_load(args.next());
            match report(&image, load) {
                Ok(text) => print!("{text}"),
                Err(err) => fail(&err),
            }
        }
        "verify" => {
            let image = fs::read(args.next().expect("image path"))?;
            let load = parse_load(args.next());
            if !verify(&image, load) {
                process::exit(1);
            }
        }
        "patch" => {
            let input = args.next().expect("input image path");
            let out = args.next().expect("output image path");
            let load = parse_load(args.next());
            let image = fs::read(&input)?;
            match patch_image(&image, load) {
                Ok((patched, checksum)) => {
                    fs::write(&out, &patched)?;
                    eprintln!("patched checksum {checksum:#010x} into {out}");
                }
                Err(err) => fail(&err),
            }
        }
        other => {
            eprintln!("unknown mode `{other}`; expected info, verify or patch");
            process::exit(2);
        }
    }
    Ok(())
}

fn fail(err: &BlockError) -> ! {
    eprintln!("error: {err}");
    process::exit(1);
}

fn parse_load(arg: Option<String>) -> u32 {
    arg.map_or(0, |s| {
        let hex = s.trim_start_matches("0x");
        u32::from_str_radix(hex, 16).expect("load address must be hex")
    })
}

/// Human-readable block report.
fn report(image: &[u8], load: u32) -> Result<String, BlockError> {
    let view = BlockView::locate(image, load)?;
    let fields = view.fields();

    let mut out = String::new();
    let _ = writeln!(out, "Module Block");
    let _ = writeln!(out, "------------");
    let _ = writeln!(out, "Name: '{}'", String::from_utf8_lossy(&fields.name));
    let _ = writeln!(out, "Hardware type: {}", fields.hardware_type);
    let _ = writeln!(out, "API Version: {}.{}", fields.api_major, fields.api_minor);
    let _ = writeln!(
        out,
        "Module Version: {}.{}.{}",
        fields.module_major, fields.module_minor, fields.module_patch
    );
    let _ = writeln!(
        out,
        "Stored Checksum: {:#010x}",
        fields.firmware_checksum
    );
    let _ = writeln!(
        out,
        "Checksum Valid: {}",
        view.verify_checksum().is_ok()
    );

    let _ = writeln!(out, "\n# Supported Commands #");
    for cmd in view.commands() {
        let _ = writeln!(out, "{:#06x}: handler {:#010x}", cmd.command_id, cmd.handler);
    }

    let _ = writeln!(out, "\n# Config Variables #");
    let required = usize::from(fields.num_required_configs);
    for (i, cfg) in view.configs().enumerate() {
        let _ = writeln!(
            out,
            "{:#06x}: {} bytes, {}, {} @ {:#010x}",
            cfg.config_id,
            cfg.byte_size,
            if cfg.is_array { "array" } else { "scalar" },
            if i < required { "required" } else { "optional" },
            cfg.variable
        );
    }
    Ok(out)
}

/// Run the full validation list, printing one line per check.
fn verify(image: &[u8], load: u32) -> bool {
    println!("Validating module block");

    let view = match BlockView::locate(image, load) {
        Ok(view) => view,
        Err(err) => {
            println!("- Block invalid: {err}");
            println!("\n**Module block is invalid**");
            return false;
        }
    };
    println!(
        "+ Valid magic number at offset {:#x}",
        view.offset()
    );

    let mut valid = true;

    match view.validate_tables() {
        Ok(()) => println!("+ Table ordering valid"),
        Err(err) => {
            println!("- {err}");
            valid = false;
        }
    }

    match reserved_vector_slots_zero(image) {
        Some(true) => println!("+ Reserved vector slots zero"),
        Some(false) => {
            println!("- Nonzero reserved vector slot");
            valid = false;
        }
        None => println!("+ Image smaller than a vector table; slots not checked"),
    }

    match view.verify_checksum() {
        Ok(checksum) => println!("+ Firmware checksum matches ({checksum:#010x})"),
        Err(err) => {
            println!("- {err}");
            valid = false;
        }
    }

    if valid {
        println!("\n**Module block is valid**");
    } else {
        println!("\n**Module block is invalid**");
    }
    valid
}

/// Check the reserved slots of the vector table at the image base. `None`
/// when the image is too small to hold one.
fn reserved_vector_slots_zero(image: &[u8]) -> Option<bool> {
    if image.len() < VECTOR_COUNT * SLOT_SIZE {
        return None;
    }

    let slot = |i: usize| {
        let off = i * SLOT_SIZE;
        u32::from_le_bytes(image[off..off + SLOT_SIZE].try_into().expect("slot width"))
    };

    let mut ok = true;
    for i in RESERVED_SYSTEM_SLOTS {
        ok &= slot(i) == 0;
    }
    for i in RESERVED_IRQ_SLOTS {
        ok &= slot(16 + i) == 0;
    }
    Some(ok)
}

/// Recompute the image checksum and write it into the block's checksum
/// field, returning the patched image and the value.
fn patch_image(image: &[u8], load: u32) -> Result<(Vec<u8>, u32), BlockError> {
    let view = BlockView::locate(image, load)?;
    let offset = view.checksum_offset();

    let checksum = image_checksum(image, offset);
    let mut patched = image.to_vec();
    patched[offset..offset + 4].copy_from_slice(&checksum.to_le_bytes());
    Ok((patched, checksum))
}
