use energy_monitor::error::MonitorError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        MonitorError::config("x"),
        MonitorError::Config { .. }
    ));
    assert!(matches!(
        MonitorError::sensor("x"),
        MonitorError::SensorUnavailable { .. }
    ));
    assert!(matches!(
        MonitorError::unknown_tariff("x"),
        MonitorError::UnknownTariff { .. }
    ));
}

#[test]
fn error_constructors_group_2() {
    let ser = MonitorError::Serialization {
        message: "s".into(),
    };
    assert!(matches!(ser, MonitorError::Serialization { .. }));
    assert!(matches!(MonitorError::io("x"), MonitorError::Io { .. }));
    assert!(matches!(
        MonitorError::network("x"),
        MonitorError::Network { .. }
    ));
    assert!(matches!(
        MonitorError::offline_missing("x"),
        MonitorError::OfflineFileMissing { .. }
    ));
    assert!(matches!(
        MonitorError::malformed("x"),
        MonitorError::MalformedOfflineData { .. }
    ));
}

#[test]
fn error_constructors_group_3() {
    assert!(matches!(MonitorError::auth("x"), MonitorError::Auth { .. }));
    assert!(matches!(
        MonitorError::validation("f", "m"),
        MonitorError::Validation { .. }
    ));
    assert!(matches!(
        MonitorError::timeout("x"),
        MonitorError::Timeout { .. }
    ));
    assert!(matches!(
        MonitorError::generic("x"),
        MonitorError::Generic { .. }
    ));
}

#[test]
fn display_messages() {
    let e = MonitorError::validation("field", "bad");
    let s = format!("{}", e);
    assert!(s.contains("Validation error"));

    let e = MonitorError::offline_missing("data/prices/offline/x.csv");
    assert_eq!(
        e.to_string(),
        "Offline price file missing: data/prices/offline/x.csv"
    );
}

#[test]
fn csv_errors_become_malformed_offline_data() {
    let mut reader = csv::Reader::from_reader("a,b\n1,2,3\n".as_bytes());
    let err = reader.records().find_map(|r| r.err()).unwrap();
    assert!(matches!(
        MonitorError::from(err),
        MonitorError::MalformedOfflineData { .. }
    ));
}
