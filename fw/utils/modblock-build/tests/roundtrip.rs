//! End-to-end: compile a module definition, serialize the image pieces,
//! and read everything back through the host-side parser.

use modblock_abi::scan::BlockView;
use modblock_abi::{BLOCK_SIZE, Region, checksum};
use modblock_build::{ConfigDef, DefaultValue, ElementType, ModuleBuilder, ModuleInfo};

const LOAD: u32 = 0x0800_0000;
const REQUIRED_BASE: u32 = 0x1000_0000;
const OPTIONAL_BASE: u32 = 0x1000_0400;

fn compiled_layout() -> modblock_build::ModuleLayout {
    let info = ModuleInfo::new(10, "env", (2, 1), (0, 9, 3)).unwrap();
    let mut builder = ModuleBuilder::new(info);

    builder.add_command(0x0009, "handle_calibrate").unwrap();
    builder.add_command(0x0002, "handle_reset").unwrap();
    builder.add_command(0x0005, "handle_sample").unwrap();

    builder
        .add_config(0x0102, ConfigDef::required_scalar("interval", ElementType::U16))
        .unwrap();
    builder
        .add_config(
            0x0101,
            ConfigDef::optional_scalar("offset", ElementType::I16, -40),
        )
        .unwrap();
    builder
        .add_config(
            0x0200,
            ConfigDef::optional_array(
                "station_id",
                ElementType::Char,
                12,
                DefaultValue::Str("unset".into()),
            ),
        )
        .unwrap();

    builder.build().unwrap()
}

fn assemble_image(layout: &modblock_build::ModuleLayout) -> Vec<u8> {
    let mut image = Vec::new();

    let command_table = LOAD;
    image.extend_from_slice(&layout.encode_command_table(|sym| match sym {
        "handle_reset" => 0x0800_1001,
        "handle_sample" => 0x0800_1041,
        "handle_calibrate" => 0x0800_1081,
        _ => unreachable!("unknown symbol {sym}"),
    }));

    let config_table = LOAD + u32::try_from(image.len()).unwrap();
    image.extend_from_slice(&layout.encode_config_table(|slot| {
        let base = match slot.region {
            Region::Required => REQUIRED_BASE,
            Region::Optional => OPTIONAL_BASE,
        };
        base + u32::try_from(slot.offset).unwrap()
    }));

    while image.len() % BLOCK_SIZE != 0 {
        image.push(0);
    }
    image.extend_from_slice(&layout.block_fields(config_table, command_table).encode());
    image
}

#[test]
fn parser_reads_back_what_the_builder_wrote() {
    let layout = compiled_layout();
    let image = assemble_image(&layout);

    let view = BlockView::locate(&image, LOAD).unwrap();
    view.validate_tables().unwrap();

    let fields = view.fields();
    assert_eq!(fields.name, *b"env   ");
    assert_eq!((fields.api_major, fields.api_minor), (2, 1));
    assert_eq!(fields.num_commands, 3);
    assert_eq!(fields.num_required_configs, 1);
    assert_eq!(fields.num_total_configs, 3);

    let ids: Vec<u16> = view.commands().map(|c| c.command_id).collect();
    assert_eq!(ids, [0x0002, 0x0005, 0x0009]);

    // Required prefix, then optional suffix, each ascending.
    let cfg_ids: Vec<u16> = view.configs().map(|c| c.config_id).collect();
    assert_eq!(cfg_ids, [0x0102, 0x0101, 0x0200]);

    let station = view.config(2);
    assert!(station.is_array);
    assert_eq!(station.byte_size, 12);
    // The record aligns to 2 and sits right after the i16 scalar.
    assert_eq!(station.variable, OPTIONAL_BASE + 2);
}

#[test]
fn optional_region_carries_encoded_defaults() {
    let layout = compiled_layout();

    // The i16 scalar sits at 0, the char-array record right after it.
    let region = &layout.optional_region;
    assert_eq!(&region[0..2], &(-40i16).to_le_bytes());

    assert_eq!(layout.configs[2].offset, 2);
    let record = &region[layout.configs[2].offset..];
    assert_eq!(&record[0..2], &6u16.to_le_bytes()); // "unset\0"
    assert_eq!(&record[2..4], &[0, 0]);
    assert_eq!(&record[4..10], b"unset\0");
    // Remaining capacity zeroed.
    assert!(record[10..16].iter().all(|&b| b == 0));
}

#[test]
fn patched_image_self_verifies() {
    let layout = compiled_layout();
    let mut image = assemble_image(&layout);

    let view = BlockView::locate(&image, LOAD).unwrap();
    let offset = view.checksum_offset();
    let value = checksum::image_checksum(&image, offset);
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());

    let view = BlockView::locate(&image, LOAD).unwrap();
    assert_eq!(view.verify_checksum().unwrap(), value);
}
