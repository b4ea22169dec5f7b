use std::collections::HashSet;

use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::attendee::{Attendee, AttendeeCategory, NewAttendee};

const ATTENDEE_COLUMNS: &str = "id, interview_id, participant_id, external_email, name, phone, category, is_interviewer, is_external, status, accepted_schedule_id, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AttendeeKey {
    Participant(Uuid),
    Email(String),
}

fn key_of(participant_id: Option<Uuid>, email: Option<&str>) -> Option<AttendeeKey> {
    match (participant_id, email) {
        (Some(id), _) => Some(AttendeeKey::Participant(id)),
        (None, Some(email)) if !email.trim().is_empty() => {
            Some(AttendeeKey::Email(email.trim().to_ascii_lowercase()))
        }
        _ => None,
    }
}

/// Normalises emails and rejects rows that would break the one-row-per-person
/// rule of an interview.
pub fn validate(attendees: &[NewAttendee]) -> Result<Vec<NewAttendee>> {
    let mut seen = HashSet::new();
    let mut normalised = Vec::with_capacity(attendees.len());
    for attendee in attendees {
        let email = attendee
            .external_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_ascii_lowercase);
        if let Some(ref email) = email {
            if !email.contains('@') {
                return Err(Error::BadRequest(format!("Invalid attendee email '{}'", email)));
            }
        }
        let Some(key) = key_of(attendee.participant_id, email.as_deref()) else {
            return Err(Error::BadRequest(
                "Each attendee needs a participant id or an external email".into(),
            ));
        };
        if !seen.insert(key) {
            return Err(Error::BadRequest(format!(
                "Attendee {} is listed more than once",
                attendee
                    .participant_id
                    .map(|id| id.to_string())
                    .or(email.clone())
                    .unwrap_or_default()
            )));
        }
        normalised.push(NewAttendee {
            external_email: email,
            ..attendee.clone()
        });
    }
    Ok(normalised)
}

/// Combined attendee set after replacing the given categories wholesale.
/// Categories absent from `replacements` keep their current rows.
pub fn plan_replacement(
    current: &[Attendee],
    replacements: &[(AttendeeCategory, Vec<NewAttendee>)],
) -> Result<Vec<NewAttendee>> {
    let replaced: HashSet<AttendeeCategory> = replacements.iter().map(|(c, _)| *c).collect();
    let mut combined: Vec<NewAttendee> = current
        .iter()
        .filter(|a| !replaced.contains(&a.category))
        .map(|a| NewAttendee {
            participant_id: a.participant_id,
            external_email: a.external_email.clone(),
            name: a.name.clone(),
            phone: a.phone.clone(),
            category: a.category,
        })
        .collect();
    for (category, rows) in replacements {
        if rows.iter().any(|r| r.category != *category) {
            return Err(Error::BadRequest(format!(
                "Attendee category mismatch in {:?} list",
                category
            )));
        }
        combined.extend(rows.iter().cloned());
    }
    validate(&combined)
}

/// The attendee row an accepting actor speaks for.
pub fn find_accepting<'a>(
    attendees: &'a [Attendee],
    participant_id: Uuid,
    email: Option<&str>,
) -> Option<&'a Attendee> {
    attendees
        .iter()
        .find(|a| a.participant_id == Some(participant_id))
        .or_else(|| {
            let email = email?.trim();
            attendees
                .iter()
                .find(|a| a.email().is_some_and(|e| e.eq_ignore_ascii_case(email)))
        })
}

pub async fn list(conn: &mut PgConnection, interview_id: Uuid) -> Result<Vec<Attendee>> {
    let rows = sqlx::query_as::<_, Attendee>(&format!(
        "SELECT {ATTENDEE_COLUMNS} FROM interview_attendees WHERE interview_id = $1 ORDER BY category, created_at"
    ))
    .bind(interview_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn insert(
    conn: &mut PgConnection,
    interview_id: Uuid,
    attendees: &[NewAttendee],
) -> Result<Vec<Attendee>> {
    let mut inserted = Vec::with_capacity(attendees.len());
    for attendee in attendees {
        let row = sqlx::query_as::<_, Attendee>(&format!(
            r#"
            INSERT INTO interview_attendees (
                interview_id, participant_id, external_email, name, phone,
                category, is_interviewer, is_external, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
            RETURNING {ATTENDEE_COLUMNS}
            "#
        ))
        .bind(interview_id)
        .bind(attendee.participant_id)
        .bind(&attendee.external_email)
        .bind(&attendee.name)
        .bind(&attendee.phone)
        .bind(attendee.category)
        .bind(attendee.is_interviewer())
        .bind(attendee.is_external())
        .fetch_one(&mut *conn)
        .await?;
        inserted.push(row);
    }
    Ok(inserted)
}

/// Deletes and reinserts each given category independently; no diffing.
pub async fn replace_categories(
    conn: &mut PgConnection,
    interview_id: Uuid,
    replacements: &[(AttendeeCategory, Vec<NewAttendee>)],
) -> Result<Vec<Attendee>> {
    for (category, rows) in replacements {
        sqlx::query("DELETE FROM interview_attendees WHERE interview_id = $1 AND category = $2")
            .bind(interview_id)
            .bind(category)
            .execute(&mut *conn)
            .await?;
        let rows = validate(rows)?;
        insert(conn, interview_id, &rows).await?;
    }
    list(conn, interview_id).await
}

pub async fn mark_accepted(
    conn: &mut PgConnection,
    attendee_id: Uuid,
    slot_id: Uuid,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE interview_attendees
        SET status = 'accepted', accepted_schedule_id = $1, updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(slot_id)
    .bind(attendee_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attendee::AttendeeStatus;
    use chrono::Utc;

    fn internal(id: Uuid, category: AttendeeCategory) -> NewAttendee {
        NewAttendee {
            participant_id: Some(id),
            external_email: None,
            name: None,
            phone: None,
            category,
        }
    }

    fn external(email: &str) -> NewAttendee {
        NewAttendee {
            participant_id: None,
            external_email: Some(email.to_string()),
            name: Some("Guest".into()),
            phone: None,
            category: AttendeeCategory::External,
        }
    }

    fn stored(new: &NewAttendee) -> Attendee {
        Attendee {
            id: Uuid::new_v4(),
            interview_id: Uuid::nil(),
            participant_id: new.participant_id,
            external_email: new.external_email.clone(),
            name: new.name.clone(),
            phone: new.phone.clone(),
            category: new.category,
            is_interviewer: new.is_interviewer(),
            is_external: new.is_external(),
            status: AttendeeStatus::Pending,
            accepted_schedule_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_people_are_rejected() {
        let id = Uuid::new_v4();
        assert!(validate(&[
            internal(id, AttendeeCategory::Interviewer),
            internal(id, AttendeeCategory::Additional),
        ])
        .is_err());
        assert!(validate(&[external("Pat@Example.com"), external(" pat@example.com ")]).is_err());
    }

    #[test]
    fn attendee_without_identity_is_rejected() {
        let nobody = NewAttendee {
            participant_id: None,
            external_email: Some("   ".into()),
            name: Some("Ghost".into()),
            phone: None,
            category: AttendeeCategory::External,
        };
        assert!(validate(&[nobody]).is_err());
        assert!(validate(&[external("not-an-email")]).is_err());
    }

    #[test]
    fn emails_are_normalised() {
        let rows = validate(&[external("  Lee@Example.COM ")]).unwrap();
        assert_eq!(rows[0].external_email.as_deref(), Some("lee@example.com"));
    }

    #[test]
    fn replacement_swaps_only_named_categories() {
        let interviewer = internal(Uuid::new_v4(), AttendeeCategory::Interviewer);
        let guest = external("guest@example.com");
        let current = vec![stored(&interviewer), stored(&guest)];

        let new_interviewer = internal(Uuid::new_v4(), AttendeeCategory::Interviewer);
        let combined = plan_replacement(
            &current,
            &[(AttendeeCategory::Interviewer, vec![new_interviewer.clone()])],
        )
        .unwrap();

        assert_eq!(combined.len(), 2);
        assert!(combined.contains(&new_interviewer));
        assert!(!combined.contains(&interviewer));
        assert!(combined.iter().any(|a| a.external_email.as_deref() == Some("guest@example.com")));
    }

    #[test]
    fn replacement_cannot_duplicate_a_kept_person() {
        let person = Uuid::new_v4();
        let current = vec![stored(&internal(person, AttendeeCategory::Additional))];
        let err = plan_replacement(
            &current,
            &[(AttendeeCategory::Interviewer, vec![internal(person, AttendeeCategory::Interviewer)])],
        );
        assert!(err.is_err());
    }

    #[test]
    fn accepting_attendee_matches_participant_then_email() {
        let me = Uuid::new_v4();
        let rows = vec![
            stored(&external("vendor@agency.com")),
            stored(&internal(me, AttendeeCategory::Interviewer)),
        ];
        assert_eq!(find_accepting(&rows, me, None).unwrap().participant_id, Some(me));
        assert_eq!(
            find_accepting(&rows, Uuid::new_v4(), Some("VENDOR@agency.com"))
                .unwrap()
                .external_email
                .as_deref(),
            Some("vendor@agency.com")
        );
        assert!(find_accepting(&rows, Uuid::new_v4(), None).is_none());
    }
}
