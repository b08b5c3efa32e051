//! Response consistency verifiers
//!
//! Each verifier compares one server response against the ledger, tolerating
//! a bounded eventual-consistency window. Verifiers are constructed per call
//! and handed to the player as its check callback.

use crate::counter::Counters;
use crate::dataset::StaticFile;
use crate::digest::{content_checksum, structural_digest};
use crate::ledger::Ledger;
use crate::model::{
    Actor, Event, JsonError, JsonEvent, JsonFullEvent, JsonFullUser, JsonReservation, JsonUser,
};
use gatecheck_http::{fatal, CheckFunc, CheckResult};
use scraper::{Html, Selector};
use std::sync::Arc;

/// Expect the JSON error envelope `{"error": code}`
pub fn check_json_error(code: &'static str) -> CheckFunc<'static> {
    Box::new(move |res| {
        let envelope: JsonError = res.json()?;
        if envelope.error != code {
            return Err(fatal!(
                "expected error code {:?}, got {:?}",
                code,
                envelope.error
            ));
        }
        Ok(())
    })
}

/// Verify an account-creation response and commit the assigned id
pub fn check_json_user_create(user: &mut Actor) -> CheckFunc<'_> {
    Box::new(move |res| {
        let json_user: JsonUser = res.json()?;
        if json_user.nickname != user.nickname {
            return Err(fatal!("account creation returned the wrong user information"));
        }
        // The id is assigned by the service
        user.id = json_user.id;
        Ok(())
    })
}

/// Verify a user identity response against a known actor
pub fn check_json_user(user: &Actor) -> CheckFunc<'_> {
    Box::new(move |res| {
        let json_user: JsonUser = res.json()?;
        if json_user.id != user.id || json_user.nickname != user.nickname {
            return Err(fatal!("wrong user information returned"));
        }
        Ok(())
    })
}

/// Verify an administrator identity response
pub fn check_json_administrator(admin: &Actor) -> CheckFunc<'_> {
    Box::new(move |res| {
        let json_admin: JsonUser = res.json()?;
        if json_admin.id != admin.id || json_admin.nickname != admin.nickname {
            return Err(fatal!("wrong administrator information returned"));
        }
        Ok(())
    })
}

/// Decode a detailed per-user response for shape only
pub fn check_json_full_user() -> CheckFunc<'static> {
    Box::new(|res| {
        let _user: JsonFullUser = res.json()?;
        Ok(())
    })
}

/// Verify a public event response
pub fn check_json_event(event: Arc<Event>) -> CheckFunc<'static> {
    Box::new(move |res| {
        let json_event: JsonEvent = res.json()?;
        let expected = event.snapshot();
        if json_event.id != expected.id || json_event.title != expected.title {
            return Err(fatal!("wrong event returned for id {}", expected.id));
        }
        Ok(())
    })
}

/// Verify a create-event response and commit the assigned id
pub fn check_json_full_event_create(event: Arc<Event>) -> CheckFunc<'static> {
    Box::new(move |res| {
        let json_event: JsonFullEvent = res.json()?;
        let expected = event.snapshot();
        if json_event.title != expected.title
            || json_event.price != expected.price
            || json_event.public != expected.public
            || json_event.closed != expected.closed
        {
            return Err(fatal!("created event does not echo the submitted fields"));
        }
        event.set_created(json_event.id);
        Ok(())
    })
}

/// Verify a full (administrator) event response
pub fn check_json_full_event(event: Arc<Event>) -> CheckFunc<'static> {
    Box::new(move |res| {
        let json_event: JsonFullEvent = res.json()?;
        let expected = event.snapshot();
        if json_event.id != expected.id
            || json_event.title != expected.title
            || json_event.price != expected.price
            || json_event.public != expected.public
        {
            return Err(fatal!("wrong event returned for id {}", expected.id));
        }
        Ok(())
    })
}

/// Verify a reservation response and record the assigned id and seat
pub fn check_json_reservation(reserved: &mut JsonReservation) -> CheckFunc<'_> {
    Box::new(move |res| {
        let response: JsonReservation = res.json()?;
        if response.sheet_rank != reserved.sheet_rank {
            return Err(fatal!(
                "reservation came back for rank {}, requested rank {}",
                response.sheet_rank,
                reserved.sheet_rank
            ));
        }
        reserved.reservation_id = response.reservation_id;
        reserved.sheet_num = response.sheet_num;
        Ok(())
    })
}

/// Reconcile an observed event list against the ledger
///
/// Events must arrive sorted ascending by id. A deficit is tolerated only
/// when every missing event is younger than the allowable delay. A surplus
/// is tolerated only when every extra event is strictly newer than the
/// maximum expected id; such entries are trimmed before further use.
pub fn check_events_list(ledger: &Ledger, events: &mut Vec<JsonEvent>) -> CheckResult<()> {
    if !events.windows(2).all(|w| w[0].id <= w[1].id) {
        return Err(fatal!("event list is not sorted by id"));
    }

    let expected = ledger.public_events_snapshot();
    if events.is_empty() {
        return Err(fatal!("event list is empty"));
    }

    if events.len() < expected.len() {
        let last_observed = events.last().map(|e| e.id).unwrap_or(0);
        let threshold = ledger.delay_threshold();
        for missed in expected.iter().filter(|e| e.id > last_observed) {
            match missed.created_at {
                // Created within the delay window; may legitimately be
                // invisible still
                Some(at) if at >= threshold => {}
                _ => {
                    return Err(fatal!(
                        "event {} is missing from the event list past the allowable delay",
                        missed.id
                    ));
                }
            }
        }
    } else if events.len() > expected.len() {
        let max_expected = expected.last().map(|e| e.id).unwrap_or(0);
        while events.len() > expected.len() {
            match events.last() {
                Some(extra) if extra.id > max_expected => {
                    events.pop();
                }
                _ => {
                    return Err(fatal!(
                        "event list has {} entries, expected at most {}",
                        events.len(),
                        expected.len()
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Verify the top page: structural digest plus the two data attributes
/// carrying the event list and the logged-in identity
pub fn check_top_page(ledger: Arc<Ledger>, expected_user: Option<JsonUser>) -> CheckFunc<'static> {
    Box::new(move |res| {
        let document = Html::parse_document(&res.text());

        let observed = structural_digest(&document);
        let expected_digest = ledger.expected_index_digest();
        if observed != expected_digest {
            return Err(fatal!(
                "top page structure digest mismatch: expected {}, got {}",
                expected_digest,
                observed
            ));
        }

        let selector = Selector::parse("#app-wrapper")
            .map_err(|_| fatal!("invalid app-wrapper selector"))?;
        let wrapper = document
            .select(&selector)
            .next()
            .ok_or_else(|| fatal!("app-wrapper not found on the top page"))?;

        let mut found = 0;
        for (name, value) in wrapper.value().attrs() {
            match name {
                "data-events" => {
                    let mut events: Vec<JsonEvent> = serde_json::from_str(value)
                        .map_err(|e| fatal!("failed to decode the event list JSON: {}", e))?;
                    check_events_list(&ledger, &mut events)?;
                    found += 1;
                }
                "data-login-user" => {
                    check_login_user_attribute(value, expected_user.as_ref())?;
                    found += 1;
                }
                _ => {}
            }
        }

        if found != 2 {
            return Err(fatal!(
                "app-wrapper is missing data-events or data-login-user"
            ));
        }
        Ok(())
    })
}

fn check_login_user_attribute(value: &str, expected: Option<&JsonUser>) -> CheckResult<()> {
    match expected {
        Some(expected) => {
            let user: Option<JsonUser> = serde_json::from_str(value)
                .map_err(|e| fatal!("failed to decode the logged-in user JSON: {}", e))?;
            match user {
                Some(user) if user.id == expected.id && user.nickname == expected.nickname => {
                    Ok(())
                }
                Some(_) => Err(fatal!("top page shows the wrong logged-in user")),
                None => Err(fatal!(
                    "top page shows no logged-in user, expected {}",
                    expected.nickname
                )),
            }
        }
        None => {
            if value != "null" {
                return Err(fatal!(
                    "top page shows a logged-in user for an anonymous session"
                ));
            }
            Ok(())
        }
    }
}

/// Verify a static asset body against its expected checksum
pub fn check_static_file_content(file: StaticFile) -> CheckFunc<'static> {
    Box::new(move |res| {
        if content_checksum(&res.body) != file.checksum {
            return Err(fatal!("static file {} content mismatch", file.path));
        }
        Ok(())
    })
}

/// Count full vs not-modified static asset responses
pub fn count_static_file_status(counters: Arc<dyn Counters>) -> CheckFunc<'static> {
    Box::new(move |res| {
        match res.status.as_u16() {
            200 => counters.increment("staticfile-200"),
            304 => counters.increment("staticfile-304"),
            other => {
                return Err(fatal!("unexpected status code {} for a static file", other));
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::model::EventState;
    use gatecheck_http::{Bytes, HeaderMap, PlayedResponse, StatusCode};
    use std::time::Duration;

    fn ledger_with_delay(delay: Duration) -> Ledger {
        Ledger::new(&Dataset::sample(), delay)
    }

    fn observed(ids: &[u64]) -> Vec<JsonEvent> {
        ids.iter()
            .map(|id| JsonEvent {
                id: *id,
                title: format!("event {}", id),
                total: 0,
                remains: 0,
            })
            .collect()
    }

    fn publish_event(ledger: &Ledger, id: u64) {
        let event = Arc::new(Event::new(EventState {
            id: 0,
            title: format!("event {}", id),
            price: 1000,
            public: true,
            closed: false,
            remains: 10,
            created_at: None,
        }));
        event.set_created(id);
        ledger.publish_event(event);
    }

    #[test]
    fn test_events_list_exact_match_passes() {
        let ledger = ledger_with_delay(Duration::from_secs(1));
        // Sample dataset: public events 1 and 2
        let mut events = observed(&[1, 2]);
        assert!(check_events_list(&ledger, &mut events).is_ok());
    }

    #[test]
    fn test_events_list_unsorted_fails() {
        let ledger = ledger_with_delay(Duration::from_secs(1));
        let mut events = observed(&[2, 1]);
        assert!(check_events_list(&ledger, &mut events).is_err());
    }

    #[test]
    fn test_events_list_recent_deficit_is_tolerated() {
        let ledger = ledger_with_delay(Duration::from_secs(1));
        publish_event(&ledger, 4);
        // Event 4 was created within the delay window
        let mut events = observed(&[1, 2]);
        assert!(check_events_list(&ledger, &mut events).is_ok());
    }

    #[test]
    fn test_events_list_stale_deficit_fails() {
        let ledger = ledger_with_delay(Duration::from_millis(20));
        publish_event(&ledger, 4);
        std::thread::sleep(Duration::from_millis(60));
        // Event 4 is now past the allowable delay
        let mut events = observed(&[1, 2]);
        assert!(check_events_list(&ledger, &mut events).is_err());
    }

    #[test]
    fn test_events_list_ancient_deficit_fails() {
        let ledger = ledger_with_delay(Duration::from_secs(1));
        // Dataset event 2 settled long before the run started
        let mut events = observed(&[1]);
        assert!(check_events_list(&ledger, &mut events).is_err());
    }

    #[test]
    fn test_events_list_newer_surplus_is_trimmed() {
        let ledger = ledger_with_delay(Duration::from_secs(1));
        let mut events = observed(&[1, 2, 9]);
        assert!(check_events_list(&ledger, &mut events).is_ok());
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_events_list_older_surplus_fails() {
        let ledger = ledger_with_delay(Duration::from_secs(1));
        // The extra entry is not newer than the maximum expected id, so it
        // cannot be a legitimately delayed creation
        let mut events = observed(&[0, 1, 2]);
        assert!(check_events_list(&ledger, &mut events).is_err());
    }

    fn played(body: &str) -> PlayedResponse {
        PlayedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn top_page_html(login_user: &str) -> String {
        format!(
            "<html><body><div id=\"app-wrapper\" \
             data-events='[{{\"id\":1,\"title\":\"Opening Night\"}},{{\"id\":2,\"title\":\"Matinee\"}}]' \
             data-login-user='{}'><span>1000</span></div></body></html>",
            login_user
        )
    }

    fn ledger_expecting(page: &str) -> Arc<Ledger> {
        let mut dataset = Dataset::sample();
        dataset.expected_index_digest = structural_digest(&Html::parse_document(page));
        Arc::new(Ledger::new(&dataset, Duration::from_secs(1)))
    }

    #[test]
    fn test_top_page_anonymous_passes() {
        let page = top_page_html("null");
        let ledger = ledger_expecting(&page);
        let check = check_top_page(ledger, None);
        assert!(check(&played(&page)).is_ok());
    }

    #[test]
    fn test_top_page_logged_in_user_must_match() {
        let page = top_page_html("{\"id\":1,\"nickname\":\"Alice\"}");
        let ledger = ledger_expecting(&page);

        let check = check_top_page(
            ledger.clone(),
            Some(JsonUser {
                id: 1,
                nickname: "Alice".to_string(),
            }),
        );
        assert!(check(&played(&page)).is_ok());

        let check = check_top_page(
            ledger,
            Some(JsonUser {
                id: 2,
                nickname: "Bob".to_string(),
            }),
        );
        assert!(check(&played(&page)).is_err());
    }

    #[test]
    fn test_top_page_anonymous_rejects_non_null_user() {
        let page = top_page_html("{\"id\":1,\"nickname\":\"Alice\"}");
        let ledger = ledger_expecting(&page);
        let check = check_top_page(ledger, None);
        assert!(check(&played(&page)).is_err());
    }

    #[test]
    fn test_top_page_digest_mismatch_is_fatal() {
        let page = top_page_html("null");
        let ledger = ledger_expecting(&page);
        let altered = page.replace("<span>1000</span>", "<span>1000</span><p>x</p>");
        let check = check_top_page(ledger, None);
        assert!(check(&played(&altered)).is_err());
    }

    #[test]
    fn test_top_page_missing_data_attribute_is_fatal() {
        let page = "<html><body><div id=\"app-wrapper\" data-events='[{\"id\":1,\"title\":\"x\"},{\"id\":2,\"title\":\"y\"}]'></div></body></html>".to_string();
        let ledger = ledger_expecting(&page);
        let check = check_top_page(ledger, None);
        assert!(check(&played(&page)).is_err());
    }

    #[test]
    fn test_json_error_code() {
        let check = check_json_error("duplicated");
        assert!(check(&played("{\"error\":\"duplicated\"}")).is_ok());

        let check = check_json_error("duplicated");
        assert!(check(&played("{\"error\":\"not_found\"}")).is_err());

        let check = check_json_error("duplicated");
        assert!(check(&played("not json")).is_err());
    }

    #[test]
    fn test_user_create_commits_assigned_id() {
        let mut user = Actor {
            id: 0,
            nickname: "Carol".to_string(),
            login_name: "carol".to_string(),
            password: "pw".to_string(),
            online: false,
            kind: crate::model::ActorKind::User,
        };

        {
            let check = check_json_user_create(&mut user);
            check(&played("{\"id\":31,\"nickname\":\"Carol\"}")).unwrap();
        }
        assert_eq!(user.id, 31);

        // Wrong nickname is a fatal mismatch
        let check = check_json_user_create(&mut user);
        assert!(check(&played("{\"id\":32,\"nickname\":\"Mallory\"}")).is_err());
    }

    #[test]
    fn test_reservation_check_records_assignment() {
        let mut reserved = JsonReservation {
            reservation_id: 0,
            sheet_rank: "A".to_string(),
            sheet_num: 0,
        };

        {
            let check = check_json_reservation(&mut reserved);
            check(&played(
                "{\"reservation_id\":9,\"sheet_rank\":\"A\",\"sheet_num\":23}",
            ))
            .unwrap();
        }
        assert_eq!(reserved.reservation_id, 9);
        assert_eq!(reserved.sheet_num, 23);

        let check = check_json_reservation(&mut reserved);
        assert!(check(&played(
            "{\"reservation_id\":10,\"sheet_rank\":\"B\",\"sheet_num\":5}"
        ))
        .is_err());
    }

    #[test]
    fn test_static_file_checksum() {
        let file = StaticFile {
            path: "/css/app.css".to_string(),
            checksum: content_checksum(b"body { }"),
        };
        let check = check_static_file_content(file.clone());
        assert!(check(&played("body { }")).is_ok());

        let check = check_static_file_content(file);
        assert!(check(&played("body{}")).is_err());
    }
}
