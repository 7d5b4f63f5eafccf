use air_sensors::drivers::htu21d::ClimateReport;
use air_sensors::{
    Driver, Htu21d, InitError, MemoryExchange, Metric, SensorState, StateExchange, SENTINEL,
};
use embedded_hal::i2c::ErrorKind;
use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

const ADDR: u8 = 0x40;

fn init_sequence() -> Vec<Transaction> {
    vec![
        Transaction::write(ADDR, vec![0xFE]),
        Transaction::write_read(ADDR, vec![0xE7], vec![0x02]),
    ]
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 0.01
}

#[test]
fn publishes_climate_and_derived_values() {
    logger::setup_for_tests();
    let mut expectations = init_sequence();
    expectations.extend([
        // datasheet vectors, 24.68 °C and 32.3 %RH
        Transaction::write_read(ADDR, vec![0xE3], vec![0x68, 0x3A, 0x7C]),
        Transaction::write_read(ADDR, vec![0xE5], vec![0x4E, 0x85, 0x6B]),
    ]);
    let mut i2c = Mock::new(&expectations);
    let exchange = MemoryExchange::new();

    let mut sensor = Htu21d::new(i2c.clone(), NoopDelay::new(), exchange.clone());
    sensor.init().unwrap();
    let report = sensor.task();

    assert!(close(report.temperature, 24.677));
    // compensated for the temperature: 32.338 - 0.15 * 0.323
    assert!(close(report.humidity, 32.289));
    assert!(report.dew_point < report.temperature);
    assert!(report.absolute_humidity > 0.0);

    assert_eq!(exchange.read("HTU21D", Metric::Temperature).as_deref(), Some("24.7"));
    assert_eq!(exchange.read("HTU21D", Metric::Humidity).as_deref(), Some("32.3"));
    assert!(exchange.read_f32("HTU21D", Metric::DewPoint).is_some());
    assert!(exchange.read_f32("HTU21D", Metric::AbsoluteHumidity).is_some());
    i2c.done();
}

#[test]
fn corrupt_temperature_frame() {
    let mut expectations = init_sequence();
    expectations.extend([
        Transaction::write_read(ADDR, vec![0xE3], vec![0x68, 0x3A, 0x7D]),
        Transaction::write_read(ADDR, vec![0xE5], vec![0x4E, 0x85, 0x6B]),
    ]);
    let mut i2c = Mock::new(&expectations);
    let exchange = MemoryExchange::new();

    let mut sensor = Htu21d::new(i2c.clone(), NoopDelay::new(), exchange.clone());
    sensor.init().unwrap();
    let report = sensor.task();

    assert_eq!(report.temperature, SENTINEL as f32);
    assert_eq!(report.dew_point, SENTINEL as f32);
    assert_eq!(report.absolute_humidity, SENTINEL as f32);
    // humidity is still usable, compensated with the 23 °C default
    assert!(close(report.humidity, 32.038));

    assert_eq!(exchange.read("HTU21D", Metric::Temperature), None);
    assert_eq!(exchange.read("HTU21D", Metric::DewPoint), None);
    assert_eq!(sensor.average().temperature, 23.0);
    i2c.done();
}

#[test]
fn nothing_before_init() {
    let mut i2c = Mock::new(&[]);
    let mut sensor = Htu21d::new(i2c.clone(), NoopDelay::new(), MemoryExchange::new());
    assert_eq!(sensor.task(), ClimateReport::NOTHING);
    assert_eq!(sensor.state(), SensorState::Uninitialized);
    i2c.done();
}

#[test]
fn failed_soft_reset() {
    let expectations = [Transaction::write(ADDR, vec![0xFE]).with_error(ErrorKind::Other)];
    let mut i2c = Mock::new(&expectations);

    let mut sensor = Htu21d::new(i2c.clone(), NoopDelay::new(), MemoryExchange::new());
    let err = sensor.init().unwrap_err();
    assert_eq!(err, InitError::SoftReset(ErrorKind::Other));
    assert_eq!(err.exit_code(), 20);
    assert_eq!(sensor.state(), SensorState::Faulted);
    i2c.done();
}

#[test]
fn renamed_instance() {
    let mut expectations = init_sequence();
    expectations.extend([
        Transaction::write_read(ADDR, vec![0xE3], vec![0x68, 0x3A, 0x7C]),
        Transaction::write_read(ADDR, vec![0xE5], vec![0x4E, 0x85, 0x6B]),
    ]);
    let mut i2c = Mock::new(&expectations);
    let exchange = MemoryExchange::new();

    let mut sensor =
        Htu21d::new(i2c.clone(), NoopDelay::new(), exchange.clone()).with_name("attic");
    sensor.init().unwrap();
    sensor.task();
    assert_eq!(sensor.name(), "attic");
    assert!(exchange.read("attic", Metric::Temperature).is_some());
    assert!(exchange.read("HTU21D", Metric::Temperature).is_none());
    i2c.done();
}
