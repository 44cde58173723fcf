//! Subscription codes, the short strings users type to subscribe.
//!
//! | Input                                  | Result                          |
//! |----------------------------------------|---------------------------------|
//! | `T-4874`, `t_4874`, `T4874`            | teacher `T-4874`                |
//! | `<name>-<room>-2024-09-01-9.30-11.00`  | course with room, date, window  |
//! | `<name>-2024-09-01-9.30-11.00`         | course with date, window        |
//! | `<name>-<room>`                        | course with room                |
//! | anything else                          | course keyed by the whole input |

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::{Captures, Regex};
use thiserror::Error;

use crate::{subject::SubjectKind, subscription::Filters};

/// Subscription input that cannot be accepted. Distinct from store and
/// pipeline errors so callers can report it back to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
  #[error("empty subscription code")]
  Empty,

  #[error("invalid date in subscription code: {0}")]
  InvalidDate(String),

  #[error("invalid time in subscription code: {0}")]
  InvalidTime(String),
}

/// What a subscription code resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCode {
  pub kind:         SubjectKind,
  pub external_key: String,
  pub name:         String,
  pub filters:      Filters,
}

static TEACHER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[Tt][-_]?(\d+)$").expect("valid regex"));

static COURSE_ROOM_WINDOW: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^(.+)-([A-Za-z0-9]+)-(\d{4})-(\d{2})-(\d{2})-(\d{1,2})\.(\d{2})-(\d{1,2})\.(\d{2})$",
  )
  .expect("valid regex")
});

static COURSE_WINDOW: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(.+)-(\d{4})-(\d{2})-(\d{2})-(\d{1,2})\.(\d{2})-(\d{1,2})\.(\d{2})$")
    .expect("valid regex")
});

static COURSE_ROOM: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(.+)-([A-Za-z0-9]+)$").expect("valid regex"));

/// Parse a subscription code. Patterns are tried from most to least
/// specific; the first match wins.
pub fn parse_code(input: &str) -> Result<ParsedCode, InputError> {
  let code = input.trim();
  if code.is_empty() {
    return Err(InputError::Empty);
  }

  if let Some(caps) = TEACHER.captures(code) {
    let digits = &caps[1];
    return Ok(ParsedCode {
      kind:         SubjectKind::Teacher,
      external_key: format!("T-{digits}"),
      name:         format!("Teacher {digits}"),
      filters:      Filters::default(),
    });
  }

  if let Some(caps) = COURSE_ROOM_WINDOW.captures(code) {
    let (date, from, to) = window(&caps, 3)?;
    return Ok(course(&caps[1], Filters {
      room: Some(caps[2].trim().to_owned()),
      date: Some(date),
      from: Some(from),
      to: Some(to),
      teacher: None,
    }));
  }

  if let Some(caps) = COURSE_WINDOW.captures(code) {
    let (date, from, to) = window(&caps, 2)?;
    return Ok(course(&caps[1], Filters {
      date: Some(date),
      from: Some(from),
      to: Some(to),
      ..Filters::default()
    }));
  }

  if let Some(caps) = COURSE_ROOM.captures(code) {
    return Ok(course(&caps[1], Filters {
      room: Some(caps[2].trim().to_owned()),
      ..Filters::default()
    }));
  }

  Ok(course(code, Filters::default()))
}

fn course(name: &str, filters: Filters) -> ParsedCode {
  let name = name.trim().to_owned();
  ParsedCode {
    kind: SubjectKind::Course,
    external_key: name.clone(),
    name,
    filters,
  }
}

/// Read `YYYY MM DD H MM H MM` starting at capture group `first`, returning
/// `(YYYY-MM-DD, HH:MM, HH:MM)`.
fn window(
  caps: &Captures<'_>,
  first: usize,
) -> Result<(String, String, String), InputError> {
  let num = |i: usize| caps[first + i].parse::<u32>().unwrap_or(u32::MAX);

  let year = caps[first].parse::<i32>().unwrap_or(i32::MAX);
  let date = NaiveDate::from_ymd_opt(year, num(1), num(2)).ok_or_else(|| {
    InputError::InvalidDate(format!(
      "{}-{}-{}",
      &caps[first],
      &caps[first + 1],
      &caps[first + 2]
    ))
  })?;

  let time = |h: usize, m: usize| {
    NaiveTime::from_hms_opt(num(h), num(m), 0)
      .map(|t| t.format("%H:%M").to_string())
      .ok_or_else(|| {
        InputError::InvalidTime(format!("{}.{}", &caps[first + h], &caps[first + m]))
      })
  };

  Ok((date.format("%Y-%m-%d").to_string(), time(3, 4)?, time(5, 6)?))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_is_rejected() {
    assert_eq!(parse_code("   "), Err(InputError::Empty));
  }

  #[test]
  fn teacher_codes() {
    for input in ["T-4874", "t_4874", "T4874", " t-4874 "] {
      let parsed = parse_code(input).unwrap();
      assert_eq!(parsed.kind, SubjectKind::Teacher);
      assert_eq!(parsed.external_key, "T-4874");
      assert_eq!(parsed.name, "Teacher 4874");
      assert!(parsed.filters.is_empty());
    }
  }

  #[test]
  fn course_with_room_and_window() {
    let parsed = parse_code("3530901/10001-101-2024-09-02-9.30-11.00").unwrap();
    assert_eq!(parsed.kind, SubjectKind::Course);
    assert_eq!(parsed.external_key, "3530901/10001");
    assert_eq!(parsed.filters, Filters {
      room:    Some("101".into()),
      date:    Some("2024-09-02".into()),
      from:    Some("09:30".into()),
      to:      Some("11:00".into()),
      teacher: None,
    });
  }

  #[test]
  fn course_with_window_only() {
    let parsed = parse_code("Math-2024-09-02-14.00-15.30").unwrap();
    assert_eq!(parsed.external_key, "Math");
    assert!(parsed.filters.room.is_none());
    assert_eq!(parsed.filters.date.as_deref(), Some("2024-09-02"));
    assert_eq!(parsed.filters.from.as_deref(), Some("14:00"));
    assert_eq!(parsed.filters.to.as_deref(), Some("15:30"));
  }

  #[test]
  fn course_with_room() {
    let parsed = parse_code("Physics-303").unwrap();
    assert_eq!(parsed.external_key, "Physics");
    assert_eq!(parsed.filters.room.as_deref(), Some("303"));
  }

  #[test]
  fn plain_course() {
    let parsed = parse_code("3530901/10001").unwrap();
    assert_eq!(parsed.kind, SubjectKind::Course);
    assert_eq!(parsed.external_key, "3530901/10001");
    assert_eq!(parsed.name, "3530901/10001");
    assert!(parsed.filters.is_empty());
  }

  #[test]
  fn impossible_dates_and_times_are_rejected() {
    assert!(matches!(
      parse_code("Math-2024-02-30-9.30-11.00"),
      Err(InputError::InvalidDate(_))
    ));
    assert!(matches!(
      parse_code("Math-2024-09-02-25.00-26.00"),
      Err(InputError::InvalidTime(_))
    ));
  }
}
