//! Row parsing for imports: the inverse of `format`. Each function takes
//! one header-keyed sheet row and either yields a validated record or a
//! human-readable error for that row. Errors never abort the batch; the
//! reconciler collects them.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::models::{Attachment, Priority, Role, TaskStatus, TodoItem, User};
use crate::report::sheet::{CellValue, SheetRow};

/// Days between the 1900-01-00 spreadsheet epoch and 1970-01-01.
const EPOCH_OFFSET_DAYS: f64 = 25569.0;
const SECS_PER_DAY: f64 = 86400.0;

#[derive(Debug, Clone)]
pub struct ParsedUserRow {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    /// Plaintext; hashed by the reconciler. Blank cells mean "keep the
    /// stored hash" for existing users.
    pub password: Option<String>,
    pub role: Role,
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedTaskRow {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub due_date: Option<String>,
    pub progress: i64,
    pub assigned_to: Vec<String>,
    pub created_by: String,
    pub attachments: Vec<Attachment>,
    pub todo_checklist: Vec<TodoItem>,
}

/// Column lookup tolerant of stray whitespace in the header row.
fn cell<'a>(row: &'a SheetRow, key: &str) -> Option<&'a CellValue> {
    row.get(key)
        .or_else(|| row.iter().find(|(k, _)| k.trim() == key).map(|(_, v)| v))
}

fn text(row: &SheetRow, key: &str) -> Option<String> {
    cell(row, key).map(|v| v.as_text().trim().to_string()).filter(|s| !s.is_empty())
}

pub fn parse_user_row(
    row: &SheetRow,
    caller_is_super_admin: bool,
    admin_invite_token: &str,
) -> Result<ParsedUserRow, String> {
    let name = text(row, "Name");
    let email = text(row, "Email");
    let role_raw = text(row, "Role");
    let (name, email, role_raw) = match (name, email, role_raw) {
        (Some(name), Some(email), Some(role_raw)) => (name, email.to_lowercase(), role_raw),
        _ => return Err("Missing required fields".to_string()),
    };

    let role = match role_raw.to_lowercase().as_str() {
        "member" => Role::Member,
        "admin" => Role::Admin,
        _ => return Err(format!("Invalid role \"{role_raw}\"")),
    };

    if role == Role::Admin {
        if !caller_is_super_admin {
            return Err("Only superadmin can create admin users".to_string());
        }
        // An unset invite token must not make a blank key pass the gate.
        let admin_key = text(row, "Admin Key").unwrap_or_default();
        if admin_invite_token.is_empty() || admin_key != admin_invite_token {
            return Err("Invalid Admin Key".to_string());
        }
    }

    Ok(ParsedUserRow {
        id: text(row, "ID"),
        name,
        email,
        password: text(row, "Password"),
        role,
        profile_image_url: text(row, "ProfileImage"),
    })
}

/// `users` is the full user table, used to resolve AssignedTo/CreatedBy
/// cells that may hold ids, emails, or display names.
pub fn parse_task_row(row: &SheetRow, users: &[User]) -> Result<ParsedTaskRow, String> {
    let title = text(row, "Title").ok_or_else(|| "Title is required".to_string())?;
    let description = text(row, "Description").unwrap_or_default();

    let priority = match text(row, "Priority") {
        None => Priority::Medium,
        Some(raw) => match raw.to_lowercase().as_str() {
            "low" => Priority::Low,
            // "normal" appears in sheets exported by older releases.
            "medium" | "normal" => Priority::Medium,
            "high" => Priority::High,
            _ => return Err(format!("Invalid priority \"{raw}\"")),
        },
    };

    // Recomputed from the checklist before save; parsed anyway so a
    // malformed cell is reported instead of silently dropped.
    let status = match text(row, "Status") {
        None => TaskStatus::Pending,
        Some(raw) => match raw.to_lowercase().as_str() {
            "pending" => TaskStatus::Pending,
            "in-progress" | "in progress" => TaskStatus::InProgress,
            "completed" => TaskStatus::Completed,
            _ => return Err(format!("Invalid status \"{raw}\"")),
        },
    };

    let due_date = cell(row, "DueDate")
        .and_then(parse_spreadsheet_date)
        .map(|naive| Utc.from_utc_datetime(&naive).to_rfc3339());

    let progress = match text(row, "Progress") {
        None => 0,
        Some(raw) => parse_progress(&raw).ok_or_else(|| format!("Invalid progress value \"{raw}\""))?,
    };

    let assigned_to = text(row, "AssignedTo")
        .map(|raw| {
            raw.split(',')
                .filter_map(|part| find_user(users, part))
                .map(|u| u.id.clone())
                .collect()
        })
        .unwrap_or_default();

    let created_by_raw = text(row, "CreatedBy").unwrap_or_default();
    let created_by = find_user(users, &created_by_raw)
        .map(|u| u.id.clone())
        .ok_or_else(|| format!("CreatedBy user \"{created_by_raw}\" not found"))?;

    Ok(ParsedTaskRow {
        title,
        description,
        priority,
        status,
        due_date,
        progress,
        assigned_to,
        created_by,
        attachments: text(row, "Attachments")
            .map(|raw| parse_attachments(&raw))
            .unwrap_or_default(),
        todo_checklist: text(row, "Todos")
            .map(|raw| parse_todos(&raw))
            .unwrap_or_default(),
    })
}

/// Accepts "75", "75%", or a bare number cell; valid range 0..=100.
fn parse_progress(raw: &str) -> Option<i64> {
    let value: f64 = raw.trim().trim_end_matches('%').trim().parse().ok()?;
    if !(0.0..=100.0).contains(&value) {
        return None;
    }
    Some(value.round() as i64)
}

/// Id match first, then case-insensitive email, then case-insensitive
/// display name.
pub fn find_user<'a>(users: &'a [User], identifier: &str) -> Option<&'a User> {
    let needle = identifier.trim();
    if needle.is_empty() {
        return None;
    }
    let lowered = needle.to_lowercase();
    users
        .iter()
        .find(|u| u.id == needle)
        .or_else(|| users.iter().find(|u| u.email.to_lowercase() == lowered))
        .or_else(|| users.iter().find(|u| u.name.to_lowercase() == lowered))
}

/// Date cells arrive three ways: a real date cell, a raw serial number,
/// or text. Serials count days from the 1900 epoch; text is tried as
/// day/month/year first, then ISO forms. Anything else is `None`.
pub fn parse_spreadsheet_date(value: &CellValue) -> Option<NaiveDateTime> {
    match value {
        CellValue::DateTime(dt) => Some(*dt),
        CellValue::Number(serial) => {
            let secs = ((serial - EPOCH_OFFSET_DAYS) * SECS_PER_DAY).round() as i64;
            DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
        }
        CellValue::Text(s) => parse_date_text(s),
        CellValue::Bool(_) => None,
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    let parts: Vec<&str> = s.split(['/', '-', '.']).collect();
    if parts.len() == 3 {
        if let (Ok(day), Ok(month), Ok(year)) = (
            parts[0].trim().parse::<u32>(),
            parts[1].trim().parse::<u32>(),
            parts[2].trim().parse::<i32>(),
        ) {
            // A small last field means the year came first (ISO),
            // handled by the fallbacks below.
            if year >= 1000 {
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                    return date.and_hms_opt(0, 0, 0);
                }
            }
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc())
}

fn attachment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?)\s*\((https?://[^\s)]+)\)$").unwrap())
}

fn todo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?) \[(✔|✘)\]$").unwrap())
}

/// Segments that do not match "name (url)" are dropped silently; a
/// malformed attachment is not worth failing the whole row.
pub fn parse_attachments(raw: &str) -> Vec<Attachment> {
    raw.split(',')
        .filter_map(|segment| {
            let caps = attachment_re().captures(segment.trim())?;
            Some(Attachment {
                name: caps[1].trim().to_string(),
                url: caps[2].to_string(),
            })
        })
        .collect()
}

pub fn parse_todos(raw: &str) -> Vec<TodoItem> {
    raw.split(" | ")
        .filter_map(|segment| {
            let caps = todo_re().captures(segment.trim())?;
            Some(TodoItem {
                text: caps[1].trim().to_string(),
                completed: &caps[2] == "✔",
                due_date: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Utc};

    fn row(pairs: &[(&str, CellValue)]) -> SheetRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn txt(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn user(id: &str, name: &str, email: &str) -> User {
        let now = Utc::now().to_rfc3339();
        User {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: Role::Member,
            profile_image_url: None,
            created_by: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn user_row_requires_name_email_and_role() {
        let err = parse_user_row(&row(&[("Name", txt("Ann"))]), true, "k").unwrap_err();
        assert_eq!(err, "Missing required fields");

        let err = parse_user_row(
            &row(&[("Name", txt("Ann")), ("Email", txt("a@b.c"))]),
            true,
            "k",
        )
        .unwrap_err();
        assert_eq!(err, "Missing required fields");
    }

    #[test]
    fn user_row_lowercases_email() {
        let parsed = parse_user_row(
            &row(&[
                ("Name", txt("Ann")),
                ("Email", txt("Ann@Example.COM")),
                ("Role", txt("Member")),
            ]),
            false,
            "k",
        )
        .unwrap();
        assert_eq!(parsed.email, "ann@example.com");
        assert_eq!(parsed.role, Role::Member);
        assert!(parsed.password.is_none());
    }

    #[test]
    fn unknown_role_is_rejected_verbatim() {
        let err = parse_user_row(
            &row(&[
                ("Name", txt("Ann")),
                ("Email", txt("a@b.c")),
                ("Role", txt("Owner")),
            ]),
            true,
            "k",
        )
        .unwrap_err();
        assert_eq!(err, "Invalid role \"Owner\"");
    }

    #[test]
    fn admin_rows_need_super_admin_caller_and_matching_key() {
        let admin_row = row(&[
            ("Name", txt("Ann")),
            ("Email", txt("a@b.c")),
            ("Role", txt("admin")),
            ("Admin Key", txt("right")),
        ]);

        let err = parse_user_row(&admin_row, false, "right").unwrap_err();
        assert_eq!(err, "Only superadmin can create admin users");

        let wrong_key = row(&[
            ("Name", txt("Ann")),
            ("Email", txt("a@b.c")),
            ("Role", txt("admin")),
            ("Admin Key", txt("wrong")),
        ]);
        let err = parse_user_row(&wrong_key, true, "right").unwrap_err();
        assert_eq!(err, "Invalid Admin Key");

        assert!(parse_user_row(&admin_row, true, "right").is_ok());
    }

    #[test]
    fn admin_rows_rejected_when_no_invite_token_is_configured() {
        // No Admin Key cell and no configured token: both sides are
        // empty strings, which must still not pass the gate.
        let admin_row = row(&[
            ("Name", txt("Ann")),
            ("Email", txt("a@b.c")),
            ("Role", txt("admin")),
        ]);
        let err = parse_user_row(&admin_row, true, "").unwrap_err();
        assert_eq!(err, "Invalid Admin Key");
    }

    #[test]
    fn task_row_requires_title() {
        let users = vec![user("u1", "Ann", "a@b.c")];
        let err = parse_task_row(&row(&[("CreatedBy", txt("a@b.c"))]), &users).unwrap_err();
        assert_eq!(err, "Title is required");
    }

    #[test]
    fn task_row_resolves_creator_and_assignees() {
        let users = vec![
            user("u1", "Ann", "ann@example.com"),
            user("u2", "Bob", "bob@example.com"),
        ];
        let parsed = parse_task_row(
            &row(&[
                ("Title", txt("Ship")),
                ("CreatedBy", txt("ann@example.com")),
                ("AssignedTo", txt("Bob, missing@example.com, u1")),
            ]),
            &users,
        )
        .unwrap();
        assert_eq!(parsed.created_by, "u1");
        // Unresolvable assignees are dropped, not fatal.
        assert_eq!(parsed.assigned_to, vec!["u2".to_string(), "u1".to_string()]);
    }

    #[test]
    fn unknown_creator_is_an_error() {
        let users = vec![user("u1", "Ann", "a@b.c")];
        let err = parse_task_row(
            &row(&[("Title", txt("Ship")), ("CreatedBy", txt("ghost@x.y"))]),
            &users,
        )
        .unwrap_err();
        assert_eq!(err, "CreatedBy user \"ghost@x.y\" not found");
    }

    #[test]
    fn progress_accepts_percent_suffix_and_rejects_out_of_range() {
        let users = vec![user("u1", "Ann", "a@b.c")];
        let ok = parse_task_row(
            &row(&[
                ("Title", txt("Ship")),
                ("CreatedBy", txt("a@b.c")),
                ("Progress", txt("75%")),
            ]),
            &users,
        )
        .unwrap();
        assert_eq!(ok.progress, 75);

        let err = parse_task_row(
            &row(&[
                ("Title", txt("Ship")),
                ("CreatedBy", txt("a@b.c")),
                ("Progress", txt("150%")),
            ]),
            &users,
        )
        .unwrap_err();
        assert_eq!(err, "Invalid progress value \"150%\"");
    }

    #[test]
    fn attachments_parse_and_drop_malformed_segments() {
        let parsed = parse_attachments(
            "Spec (https://example.com/spec.pdf), not-a-link, Logo (https://example.com/l.png)",
        );
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "Spec");
        assert_eq!(parsed[0].url, "https://example.com/spec.pdf");
        assert_eq!(parsed[1].name, "Logo");
    }

    #[test]
    fn todos_parse_check_marks() {
        let parsed = parse_todos("write [✔] | review [✘] | junk");
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].completed);
        assert!(!parsed[1].completed);
        assert_eq!(parsed[1].text, "review");
    }

    #[test]
    fn serial_number_dates_use_the_spreadsheet_epoch() {
        // 44197 is 2021-01-01.
        let parsed = parse_spreadsheet_date(&CellValue::Number(44197.0)).unwrap();
        assert_eq!(parsed.date().year(), 2021);
        assert_eq!(parsed.date().month(), 1);
        assert_eq!(parsed.date().day(), 1);
    }

    #[test]
    fn text_dates_parse_day_first_then_iso() {
        let dmy = parse_spreadsheet_date(&txt("9/5/2024")).unwrap();
        assert_eq!((dmy.day(), dmy.month(), dmy.year()), (9, 5, 2024));

        let iso = parse_spreadsheet_date(&txt("2024-05-09")).unwrap();
        assert_eq!((iso.day(), iso.month(), iso.year()), (9, 5, 2024));

        assert!(parse_spreadsheet_date(&txt("next tuesday")).is_none());
    }
}
