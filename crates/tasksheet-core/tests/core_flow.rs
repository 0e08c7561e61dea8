use chrono::NaiveDate;
use serde_json::json;
use tasksheet_core::calendar::CalendarMap;
use tasksheet_core::datastore::SheetStore;
use tasksheet_core::filter::Filter;
use tasksheet_core::occurrence::{ExpandOptions, expand_all};
use tasksheet_core::sheet::{ColumnMap, parse_task_rows, parse_working_days};
use tasksheet_core::workdays::select_upcoming_working_dates;
use tempfile::tempdir;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

#[test]
fn sheet_snapshot_to_calendar() {
    let temp = tempdir().expect("tempdir");
    let store = SheetStore::open(temp.path()).expect("open store");

    store
        .save_task_rows(&[
            vec![json!("Task ID"), json!("Task"), json!("Doer"), json!("Start"), json!("Freq"), json!("Time")],
            vec![json!("CL-1"), json!("Open shutters"), json!("Asha"), json!("11/06/2024"), json!("Daily"), json!("09:00")],
            vec![json!("MT-4"), json!("Grease conveyor"), json!("Ravi"), json!("Date(2024,5,3)"), json!("Weekly"), json!(null)],
            vec![json!("DL-9"), json!("Call vendor"), json!("Meena"), json!("2024-06-13"), json!("One Time"), json!(null)],
            vec![json!("DL-10"), json!("Broken row"), json!("Meena"), json!("soon"), json!("Daily"), json!(null)],
        ])
        .expect("save rows");

    // Saturday 15 and Sunday 16 June are not working days.
    store
        .save_working_day_cells(&[
            json!("10/06/2024"),
            json!("11/06/2024"),
            json!("12/06/2024"),
            json!(["13/06/2024"]),
            json!("14/06/2024"),
            json!("17/06/2024"),
            json!("holiday"),
        ])
        .expect("save workdays");

    let tasks = parse_task_rows(&store.load_task_rows().expect("rows"), &ColumnMap::default());
    let working_days = parse_working_days(&store.load_working_day_cells().expect("cells"));
    assert_eq!(tasks.len(), 4);
    assert_eq!(working_days.len(), 6);

    let today = ymd(2024, 6, 10);
    let window = select_upcoming_working_dates(&working_days, today);
    assert_eq!(window.last_working_date, Some(ymd(2024, 6, 17)));
    assert_eq!(window.dates_in_range.len(), 5);

    let expanded = expand_all(&tasks, &working_days, today, &ExpandOptions::default());
    assert!(expanded.truncated.is_empty());

    let map = CalendarMap::build(&expanded.occurrences);
    let ids_on = |day: NaiveDate| -> Vec<String> {
        map.entries_on(day).iter().map(|e| e.task_id.clone()).collect()
    };
    assert_eq!(ids_on(ymd(2024, 6, 11)), vec!["CL-1"]);
    assert_eq!(ids_on(ymd(2024, 6, 13)), vec!["CL-1", "DL-9"]);
    assert_eq!(ids_on(ymd(2024, 6, 15)), Vec::<String>::new());
    // 3 June weekly lands on the 10th (today, excluded) and the 17th.
    assert_eq!(ids_on(ymd(2024, 6, 17)), vec!["CL-1", "MT-4"]);

    let filter = Filter::parse(&["assignee:ravi".to_string()], today).expect("parse filter");
    let ravi: Vec<NaiveDate> = expanded
        .occurrences
        .iter()
        .filter(|occ| filter.matches(occ))
        .map(|occ| occ.date)
        .collect();
    assert_eq!(ravi, vec![ymd(2024, 6, 17)]);
}
