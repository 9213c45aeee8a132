use super::*;
use chrono::{FixedOffset, TimeZone};
use ical::parser::ical::{IcalParser, component::IcalEvent};
use std::io::BufReader;

fn entry(id: &str, title: &str, hour: u32) -> CalendarEntry {
    let tz = FixedOffset::east_opt(8 * 3600).unwrap();
    CalendarEntry {
        id: id.to_string(),
        title: title.to_string(),
        start_time: tz.with_ymd_and_hms(2024, 7, 15, hour, 0, 0).unwrap(),
        end_time: tz.with_ymd_and_hms(2024, 7, 15, hour + 2, 0, 0).unwrap(),
        location: Some("Gardens by the Bay".to_string()),
        description: Some("Bring water; wear comfy shoes, please".to_string()),
        recurrence: None,
    }
}

fn property<'a>(event: &'a IcalEvent, name: &str) -> Option<&'a str> {
    event
        .properties
        .iter()
        .find(|prop| prop.name.eq_ignore_ascii_case(name))
        .and_then(|prop| prop.value.as_deref())
}

#[test]
fn test_export_format() {
    let mut weekly = entry("app_2", "Yoga (Recurring)", 7);
    weekly.recurrence = Some(RecurrenceTag::Weekly);
    let entries = vec![entry("app_1", "Night Walk", 19), weekly];

    let exporter = IcsExporter::default();
    let ics_content = exporter.export(&entries);

    assert!(ics_content.starts_with("BEGIN:VCALENDAR\r\n"));
    assert!(ics_content.ends_with("END:VCALENDAR\r\n"));
    assert!(ics_content.contains("X-WR-CALNAME:My Events"));
    assert!(ics_content.contains("UID:app_1@evcal"));
    // 本地 19:00 (+08:00) 即 UTC 11:00
    assert!(ics_content.contains("DTSTART:20240715T110000Z"));
    assert!(ics_content.contains("DTEND:20240715T130000Z"));
    assert!(ics_content.contains("DESCRIPTION:Bring water\\; wear comfy shoes\\, please"));
    assert!(ics_content.contains("X-EVCAL-RECURRENCE:WEEKLY"));
    assert!(ics_content.contains("TRIGGER:-PT30M"));
    assert_eq!(ics_content.matches("BEGIN:VEVENT").count(), 2);
}

#[test]
fn test_export_without_optional_parts() {
    let mut bare = entry("app_1", "Quiet", 9);
    bare.location = None;

    let exporter = IcsExporter::new(IcsOptions {
        calendar_name: None,
        timezone: Some("Asia/Singapore".to_string()),
        include_description: false,
        reminder_minutes: None,
    });
    let ics_content = exporter.export([&bare]);

    assert!(!ics_content.contains("X-WR-CALNAME"));
    assert!(ics_content.contains("X-WR-TIMEZONE:Asia/Singapore"));
    assert!(!ics_content.contains("LOCATION:"));
    assert!(!ics_content.contains("DESCRIPTION:"));
    assert!(!ics_content.contains("BEGIN:VALARM"));
    assert!(!ics_content.contains("X-EVCAL-RECURRENCE"));
}

#[test]
fn test_export_parses_back() {
    let entries = vec![entry("app_1", "Night Walk", 19), entry("app_2", "Brunch", 10)];
    let ics_content = IcsExporter::default().export(&entries);

    let parser = IcalParser::new(BufReader::new(ics_content.as_bytes()));
    let calendars: Vec<_> = parser.collect::<Result<_, _>>().expect("解析导出的ICS失败");
    assert_eq!(calendars.len(), 1);

    let events = &calendars[0].events;
    assert_eq!(events.len(), 2);
    assert_eq!(property(&events[0], "SUMMARY"), Some("Night Walk"));
    assert_eq!(property(&events[1], "UID"), Some("app_2@evcal"));
    assert_eq!(property(&events[1], "LOCATION"), Some("Gardens by the Bay"));
    assert_eq!(events[0].alarms.len(), 1);
}

#[test]
fn test_long_lines_are_folded() {
    let title = format!("{}{}", "FestivalOfLights".repeat(6), "夜市".repeat(20));
    let long = entry("app_1", &title, 19);
    let ics_content = IcsExporter::default().export([&long]);

    let body = ics_content.trim_end_matches("\r\n");
    assert!(body.split("\r\n").all(|line| line.len() <= 75));
    assert!(body.split("\r\n").any(|line| line.starts_with(' ')));
    assert!(ics_content.contains("SUMMARY:FestivalOfLights"));

    let parser = IcalParser::new(BufReader::new(ics_content.as_bytes()));
    let calendars: Vec<_> = parser.collect::<Result<_, _>>().expect("解析导出的ICS失败");
    let events = &calendars[0].events;
    assert_eq!(property(&events[0], "SUMMARY"), Some(title.as_str()));
}

#[test]
fn test_fold_respects_char_boundaries() {
    let mut folded = String::new();
    push_line(&mut folded, &format!("SUMMARY:{}", "é".repeat(80)));

    let lines: Vec<_> = folded.trim_end_matches("\r\n").split("\r\n").collect();
    assert!(lines.len() > 1);
    assert!(lines.iter().all(|line| line.len() <= 75));
    let unfolded: String = lines
        .iter()
        .enumerate()
        .map(|(i, line)| if i == 0 { *line } else { &line[1..] })
        .collect();
    assert_eq!(unfolded, format!("SUMMARY:{}", "é".repeat(80)));
}
