use std::fs;

use air_sensors::exchange::Value;
use air_sensors::{Driver, FileExchange, Metric, StateExchange, K30};
use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
use temp_dir::TempDir;

#[test]
fn one_file_per_metric() {
    let dir = TempDir::new().unwrap();
    let mut exchange = FileExchange::new(dir.path());

    exchange
        .publish("HTU21D", Metric::Temperature, Value::Decimal(21.349))
        .unwrap();
    exchange
        .publish("CCS811", Metric::Baseline, Value::Hex16(0x8f1e))
        .unwrap();

    let path = dir.path().join("HTU21D").join("tc");
    assert_eq!(exchange.path("HTU21D", Metric::Temperature), path);
    assert_eq!(fs::read_to_string(path).unwrap(), "21.3");
    assert_eq!(exchange.read_f32("HTU21D", Metric::Temperature), Some(21.3));
    assert_eq!(exchange.read_u16("CCS811", Metric::Baseline), Some(0x8f1e));

    let leftovers: Vec<_> = fs::read_dir(dir.path().join("HTU21D"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec!["tc"]);
}

#[test]
fn publish_overwrites() {
    let dir = TempDir::new().unwrap();
    let mut exchange = FileExchange::new(dir.path());

    exchange.publish("K30", Metric::Co2, Value::Integer(1200)).unwrap();
    exchange.publish("K30", Metric::Co2, Value::Integer(450)).unwrap();
    assert_eq!(exchange.read("K30", Metric::Co2).as_deref(), Some("450"));
}

#[test]
fn missing_or_garbage_is_no_data() {
    let dir = TempDir::new().unwrap();
    let exchange = FileExchange::new(dir.path());
    assert_eq!(exchange.read_f32("HTU21D", Metric::Humidity), None);

    exchange.create_device_dir("HTU21D").unwrap();
    fs::write(dir.path().join("HTU21D").join("rh"), "").unwrap();
    assert_eq!(exchange.read_f32("HTU21D", Metric::Humidity), None);
    fs::write(dir.path().join("HTU21D").join("rh"), "4x.1").unwrap();
    assert_eq!(exchange.read_f32("HTU21D", Metric::Humidity), None);
    fs::write(dir.path().join("HTU21D").join("rh"), "41.5\n").unwrap();
    assert_eq!(exchange.read_f32("HTU21D", Metric::Humidity), Some(41.5));
}

#[test]
fn failed_publish_does_not_stop_polling() {
    let dir = TempDir::new().unwrap();
    // a file where the device directory should be
    fs::write(dir.path().join("K30"), "").unwrap();
    let exchange = FileExchange::new(dir.path());

    let response = [0x21, 0x01, 0x90, 0xB2];
    let expectations = [
        Transaction::write(0x68, vec![0x22, 0x00, 0x08, 0x2A]),
        Transaction::read(0x68, response.to_vec()),
        Transaction::write(0x68, vec![0x22, 0x00, 0x08, 0x2A]),
        Transaction::read(0x68, response.to_vec()),
    ];
    let mut i2c = Mock::new(&expectations);
    let mut sensor = K30::new(i2c.clone(), NoopDelay::new(), exchange);
    sensor.init().unwrap();
    assert_eq!(sensor.task(), 400);
    assert_eq!(sensor.task(), 400);
    i2c.done();
}
