#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must parse or fail cleanly, never panic
    let Ok(snapshot) = energy_monitor::prices::parse_snapshot(data) else {
        return;
    };

    // Projection across a DST change exercises skipped wall-clock times
    let date = chrono::NaiveDate::from_ymd_opt(2023, 3, 26).unwrap();
    let series = snapshot.project(&chrono_tz::Europe::London, date);
    for pair in series.points().windows(2) {
        assert!(pair[0].valid_to <= pair[1].valid_from);
    }
});
