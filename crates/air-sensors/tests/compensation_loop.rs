//! The climate sensor and the gas sensors only meet through the state
//! exchange, these tests run them side by side the way the services do.

use air_sensors::{Ccs811, Compensated, Driver, FileExchange, Htu21d, MemoryExchange, Sgp30};
use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

const HTU21D: u8 = 0x40;
const CCS811: u8 = 0x5A;
const SGP30: u8 = 0x58;

fn climate_sensor(cycles: usize) -> Vec<Transaction> {
    let mut expectations = vec![
        Transaction::write(HTU21D, vec![0xFE]),
        Transaction::write_read(HTU21D, vec![0xE7], vec![0x02]),
    ];
    for _ in 0..cycles {
        // 24.68 °C, 32.34 %RH before compensation
        expectations.push(Transaction::write_read(HTU21D, vec![0xE3], vec![0x68, 0x3A, 0x7C]));
        expectations.push(Transaction::write_read(HTU21D, vec![0xE5], vec![0x4E, 0x85, 0x6B]));
    }
    expectations
}

fn ccs811_init() -> Vec<Transaction> {
    vec![
        Transaction::write_read(CCS811, vec![0x00], vec![0x10]),
        Transaction::write(CCS811, vec![0xF4]),
        Transaction::write(CCS811, vec![0x01, 0x10]),
        Transaction::write_read(CCS811, vec![0xE0], vec![0x00]),
        Transaction::write_read(CCS811, vec![0x20], vec![0x81]),
        Transaction::write_read(CCS811, vec![0x21], vec![0x12]),
        Transaction::write_read(CCS811, vec![0x24], vec![0x11, 0x00]),
        Transaction::write_read(CCS811, vec![0xE0], vec![0x00]),
        Transaction::write(CCS811, vec![0x05, 0x64, 0x00, 0x60, 0x00]),
    ]
}

#[test]
fn climate_reaches_gas_sensor() {
    logger::setup_for_tests();
    let exchange = MemoryExchange::new();

    let mut climate_bus = Mock::new(&climate_sensor(5));
    let mut climate = Htu21d::new(climate_bus.clone(), NoopDelay::new(), exchange.clone());

    let mut expectations = ccs811_init();
    // published 24.7 °C and 32.3 %RH: floor(64.6), floor(99.4)
    expectations.push(Transaction::write(CCS811, vec![0x05, 64, 0x00, 99, 0x00]));
    let mut gas_bus = Mock::new(&expectations);
    let mut gas = Ccs811::new(gas_bus.clone(), NoopDelay::new(), exchange.clone());

    climate.init().unwrap();
    gas.init().unwrap();

    // before the climate sensor published anything the cycle is skipped
    gas.comp_task();
    for _ in 0..5 {
        climate.task();
        gas.comp_task();
    }

    climate_bus.done();
    gas_bus.done();
}

#[test]
fn absolute_humidity_through_files() {
    let dir = temp_dir::TempDir::new().unwrap();
    let exchange = FileExchange::new(dir.path());

    let mut climate_bus = Mock::new(&climate_sensor(5));
    let mut climate = Htu21d::new(climate_bus.clone(), NoopDelay::new(), exchange.clone());

    let expectations = [
        Transaction::write(SGP30, vec![0x36, 0x82]),
        Transaction::read(
            SGP30,
            vec![0x12, 0x34, 0x37, 0x00, 0x00, 0x81, 0x01, 0x90, 0x4C],
        ),
        Transaction::write(SGP30, vec![0x20, 0x2F]),
        Transaction::read(SGP30, vec![0x00, 0x22, 0x65]),
        Transaction::write(SGP30, vec![0x20, 0x03]),
        Transaction::write(SGP30, vec![0x20, 0x61, 10, 71, 0xC5]),
        // 7.3 g/m³
        Transaction::write(SGP30, vec![0x20, 0x61, 7, 76, 0x6F]),
    ];
    let mut gas_bus = Mock::new(&expectations);
    let mut gas = Sgp30::new(gas_bus.clone(), NoopDelay::new(), exchange.clone());

    climate.init().unwrap();
    gas.init().unwrap();
    for _ in 0..5 {
        climate.task();
        gas.comp_task();
    }

    let path = dir.path().join("HTU21D").join("ah");
    assert_eq!(std::fs::read_to_string(path).unwrap(), "7.3");
    let path = dir.path().join("SGP30").join("ah");
    assert_eq!(std::fs::read_to_string(path).unwrap(), "7.3");

    climate_bus.done();
    gas_bus.done();
}
