//! Integration tests for regmap-common library.

use regmap_common::{
    Access, DeviceConfig, Error, Format, Mode, RangeStats, RegionType, RegisterDescriptor, Role,
    Session, SettingsGroup, generate, import, map_address, optimize, persistence, unmap_address,
};

fn hr(address: u16) -> RegisterDescriptor {
    RegisterDescriptor::with_default_tag(address, RegionType::HoldingRegister)
}

#[test]
fn test_address_windows() {
    let windows = [
        (RegionType::Coil, 1, 65536),
        (RegionType::DiscreteInput, 10001, 75536),
        (RegionType::InputRegister, 30001, 95536),
        (RegionType::HoldingRegister, 40001, 105536),
    ];

    for (region, low, high) in windows {
        assert_eq!(map_address(0, region).0, low);
        assert_eq!(map_address(u16::MAX, region).0, high);

        // Strictly monotonic, spot checked across the space.
        let mut previous = None;
        for internal in (0..=u16::MAX).step_by(997) {
            let (mapped, _) = map_address(internal, region);
            if let Some(p) = previous {
                assert!(mapped > p);
            }
            assert_eq!(unmap_address(mapped, region), Some(internal));
            previous = Some(mapped);
        }
    }
}

#[test]
fn test_holding_register_scenario() {
    let mut session = Session::new();
    for addr in [0, 1, 2, 5, 6] {
        session.add_register(hr(addr)).unwrap();
    }

    let ranges = session.optimize();
    assert_eq!(ranges.len(), 2);
    assert_eq!((ranges[0].start_addr, ranges[0].count), (0, 3));
    assert_eq!((ranges[1].start_addr, ranges[1].count), (5, 2));

    let stats = session.stats();
    assert_eq!(stats, RangeStats::new(5, 2));
    assert_eq!(
        stats.to_string(),
        "Statistics: 5 registers, 2 ranges (60.0% reduction)"
    );
}

#[test]
fn test_quick_add_scenario() {
    let mut session = Session::new();
    let added = session
        .quick_add_consecutive(10, RegionType::Coil, 5, Access::default())
        .unwrap();
    assert_eq!(added, 5);

    let regs = session.registers().unwrap();
    let internal: Vec<u16> = regs.iter().map(|r| r.internal_address).collect();
    let mapped: Vec<u32> = regs.iter().map(|r| r.mapped_address()).collect();
    assert_eq!(internal, vec![10, 11, 12, 13, 14]);
    assert_eq!(mapped, vec![11, 12, 13, 14, 15]);
    assert_eq!(regs[0].tag_name, "COIL_0010");
    assert_eq!(regs[4].tag_name, "COIL_0014");

    // Overlapping quick add skips what exists; a plain add fails.
    let added = session
        .quick_add_consecutive(12, RegionType::Coil, 5, Access::default())
        .unwrap();
    assert_eq!(added, 2);
    assert!(matches!(
        session.add_register(RegisterDescriptor::with_default_tag(10, RegionType::Coil)),
        Err(Error::DuplicateTag(_))
    ));
}

#[test]
fn test_duplicate_address_scenario() {
    let mut session = Session::new();
    session.add_register(hr(5)).unwrap();

    let again = RegisterDescriptor::new(Some("SECOND"), 5, RegionType::HoldingRegister).unwrap();
    let err = session.add_register(again).unwrap_err();
    assert!(matches!(
        err,
        Error::DuplicateAddress {
            mapped: 40006,
            ..
        }
    ));
    assert_eq!(session.registers().unwrap().len(), 1);
}

#[test]
fn test_optimizer_properties() {
    let empty: Vec<RegisterDescriptor> = Vec::new();
    assert!(optimize(&empty).is_empty());

    let consecutive: Vec<_> = (0..20).map(hr).collect();
    let ranges = optimize(&consecutive);
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].count, 20);

    let sparse: Vec<_> = (0..10).map(|i| hr(i * 3)).collect();
    let ranges = optimize(&sparse);
    assert_eq!(ranges.len(), 10);
    assert_eq!(
        RangeStats::new(sparse.len(), ranges.len()).reduction_pct(),
        Some(0.0)
    );
    assert_eq!(optimize(&sparse), ranges);
}

fn three_slave_master() -> DeviceConfig {
    let mut config = DeviceConfig::with_role(Role::Master);
    config.add_target_slave(1).unwrap();
    config.add_target_slave(2).unwrap();
    config.add_target_slave(3).unwrap();

    config.add_register(Some(1), hr(0)).unwrap();
    config
        .add_register(
            Some(1),
            RegisterDescriptor::new(Some("SETPOINT"), 1, RegionType::HoldingRegister)
                .unwrap()
                .with_access(Access::write(Mode::Cyclic)),
        )
        .unwrap();
    config
        .quick_add_consecutive(Some(2), 0, RegionType::Coil, 4, Access::write(Mode::OneTime))
        .unwrap();
    config
        .add_register(
            Some(3),
            RegisterDescriptor::new(Some("FLOW"), 7, RegionType::InputRegister).unwrap(),
        )
        .unwrap();
    config
}

#[test]
fn test_persistence_roundtrips() {
    let empty = DeviceConfig::new();
    assert_eq!(persistence::load(&persistence::save(&empty).unwrap()).unwrap(), empty);

    let master = three_slave_master();
    assert_eq!(persistence::load(&persistence::save(&master).unwrap()).unwrap(), master);

    let mut custom = DeviceConfig::new();
    custom
        .settings
        .set(SettingsGroup::Common, "MODBUS_BAUDRATE", "38400")
        .unwrap();
    custom
        .settings
        .set(SettingsGroup::Master, "MODBUS_MAX_RETRIES", "5")
        .unwrap();
    assert_eq!(persistence::load(&persistence::save(&custom).unwrap()).unwrap(), custom);

    // The CBOR snapshot carries the same document.
    let bytes = persistence::to_bytes(&master, Format::Cbor).unwrap();
    assert_eq!(persistence::from_bytes(&bytes, Format::Cbor).unwrap(), master);
}

#[test]
fn test_slave_generate_parse_roundtrip() {
    let mut config = DeviceConfig::new();
    config.set_slave_id(42).unwrap();
    config.add_register(None, hr(0)).unwrap();
    config
        .add_register(
            None,
            RegisterDescriptor::new(Some("ALARM"), 3, RegionType::DiscreteInput).unwrap(),
        )
        .unwrap();
    config
        .quick_add_consecutive(None, 100, RegionType::InputRegister, 3, Access::default())
        .unwrap();

    let parsed = import::parse(&generate(&config).header).unwrap();
    assert_eq!(parsed.role(), Role::Slave);
    assert_eq!(parsed.slave_id(), 42);

    let slots = |c: &DeviceConfig| -> Vec<(u16, RegionType, String)> {
        c.local_registers()
            .iter()
            .map(|r| (r.internal_address, r.region_type, r.tag_name.clone()))
            .collect()
    };
    assert_eq!(slots(&parsed), slots(&config));
}

#[test]
fn test_master_generate_parse_roundtrip() {
    let config = three_slave_master();
    let parsed = import::parse(&generate(&config).header).unwrap();

    assert_eq!(parsed.role(), Role::Master);
    assert_eq!(parsed.target_slave_ids(), config.target_slave_ids());
    // Every identifier carries its slave suffix, so attribution is exact.
    assert_eq!(parsed.slave_registers(), config.slave_registers());
}

#[test]
fn test_generated_header_shape() {
    let config = three_slave_master();
    let files = generate(&config);

    assert!(files.header.contains("#define MODBUS_DEVICE_TYPE_MASTER"));
    assert!(files.header.contains("/* Target slave IDs: 1, 2, 3 */"));
    assert!(files.header.contains("MODBUS_HOLDING_REG_0001_SLAVE1"));
    assert!(files.header.contains("/* Slave 1: SETPOINT [Write/Cyclic] */"));
    assert!(files.header.contains("/* Slave 3: FLOW [Read] */"));
    assert!(!files.header.contains("MODBUS_SLAVE_ID "));

    // HR 0-1, coils 0-3 and IR 7 give three ranges.
    assert!(
        files
            .header
            .contains("#define MODBUS_REGISTER_RANGES_COUNT        (3)")
    );
    assert!(files.source.contains("g_modbus_register_ranges[3]"));
}
