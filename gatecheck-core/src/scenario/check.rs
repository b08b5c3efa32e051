//! Check scenario variants: exhaustive assertions of every reachable error
//! and success path per capability

use super::{event_edit_json, event_post_json, Harness};
use crate::model::JsonUser;
use crate::report;
use crate::verify;
use gatecheck_http::{fatal, CheckAction, CheckResult, HttpMethod, StatusCode};
use serde_json::json;

impl Harness {
    /// Account creation, including duplicate rejection
    pub async fn check_create_user(&self) -> CheckResult<()> {
        let mut ticket = self.pool.pop_new_user()?;
        let (user, checker) = ticket.parts();
        checker.reset_session()?;

        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/api/users".to_string(),
                expected_status: Some(StatusCode::CREATED),
                post_json: Some(json!({
                    "nickname": user.nickname,
                    "login_name": user.login_name,
                    "password": user.password,
                })),
                description: "a new user can be created",
                check: Some(verify::check_json_user_create(user)),
                ..Default::default()
            })
            .await?;

        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/api/actions/login".to_string(),
                expected_status: Some(StatusCode::OK),
                post_json: Some(json!({
                    "login_name": user.login_name,
                    "password": user.password,
                })),
                description: "the created user can log in",
                check: Some(verify::check_json_user(user)),
                ..Default::default()
            })
            .await?;
        user.online = true;

        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/api/users".to_string(),
                expected_status: Some(StatusCode::CONFLICT),
                post_json: Some(json!({
                    "nickname": user.nickname,
                    "login_name": user.login_name,
                    "password": user.password,
                })),
                description: "creating the same account twice is rejected",
                check: Some(verify::check_json_error("duplicated")),
                ..Default::default()
            })
            .await?;

        ticket.publish();
        Ok(())
    }

    /// Login and logout, including every credential error path
    pub async fn check_login(&self) -> CheckResult<()> {
        let Some(mut ticket) = self.pool.pop_random_user() else {
            return Ok(());
        };
        let (user, checker) = ticket.parts();
        checker.reset_session()?;
        user.online = false;

        self.login_app_user(checker, user).await?;
        self.logout_app_user(checker, user).await?;

        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/api/actions/logout".to_string(),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                description: "logging out twice is rejected",
                check: Some(verify::check_json_error("login_required")),
                ..Default::default()
            })
            .await?;

        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/api/actions/login".to_string(),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                post_json: Some(json!({
                    "login_name": self.rng.alpha_string(32),
                    "password": user.password,
                })),
                description: "an unknown user cannot log in",
                check: Some(verify::check_json_error("authentication_failed")),
                ..Default::default()
            })
            .await?;

        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/api/actions/login".to_string(),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                post_json: Some(json!({
                    "login_name": user.login_name,
                    "password": self.rng.alpha_string(32),
                })),
                description: "a wrong password cannot log in",
                check: Some(verify::check_json_error("authentication_failed")),
                ..Default::default()
            })
            .await?;

        Ok(())
    }

    /// Administrator login, including rejection of app-user credentials
    pub async fn check_admin_login(&self) -> CheckResult<()> {
        let Some(mut admin_ticket) = self.pool.pop_random_administrator() else {
            return Ok(());
        };
        let (admin, admin_checker) = admin_ticket.parts();
        admin_checker.reset_session()?;
        admin.online = false;

        let Some(mut user_ticket) = self.pool.pop_random_user() else {
            return Ok(());
        };
        let (user, user_checker) = user_ticket.parts();

        user_checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/admin/api/actions/login".to_string(),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                post_json: Some(json!({
                    "login_name": user.login_name,
                    "password": user.password,
                })),
                description: "an ordinary user cannot log in as administrator",
                check: Some(verify::check_json_error("authentication_failed")),
                ..Default::default()
            })
            .await?;

        self.login_administrator(admin_checker, admin, None).await?;
        self.logout_administrator(admin_checker, admin).await?;

        admin_checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/admin/api/actions/logout".to_string(),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                description: "logging out twice as administrator is rejected",
                check: Some(verify::check_json_error("admin_login_required")),
                ..Default::default()
            })
            .await?;

        admin_checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/admin/api/actions/login".to_string(),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                post_json: Some(json!({
                    "login_name": self.rng.alpha_string(32),
                    "password": admin.password,
                })),
                description: "an unknown administrator cannot log in",
                check: Some(verify::check_json_error("authentication_failed")),
                ..Default::default()
            })
            .await?;

        admin_checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/admin/api/actions/login".to_string(),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                post_json: Some(json!({
                    "login_name": admin.login_name,
                    "password": self.rng.alpha_string(32),
                })),
                description: "a wrong administrator password cannot log in",
                check: Some(verify::check_json_error("authentication_failed")),
                ..Default::default()
            })
            .await?;

        Ok(())
    }

    /// Top page structure and embedded data, in a random session state
    pub async fn check_top_page(&self) -> CheckResult<()> {
        let Some(mut ticket) = self.pool.pop_random_user() else {
            return Ok(());
        };
        let (user, checker) = ticket.parts();

        match self.rng.pick(3) {
            0 => self.login_app_user(checker, user).await?,
            1 => self.logout_app_user(checker, user).await?,
            _ => {}
        }

        let expected_user = user.online.then(|| JsonUser {
            id: user.id,
            nickname: user.nickname.clone(),
        });

        checker
            .play(CheckAction {
                path: "/".to_string(),
                expected_status: Some(StatusCode::OK),
                description: "the top page is consistent with the ledger",
                check: Some(verify::check_top_page(self.ledger.clone(), expected_user)),
                ..Default::default()
            })
            .await
    }

    pub async fn check_my_page(&self) -> CheckResult<()> {
        let Some(mut ticket) = self.pool.pop_random_user() else {
            return Ok(());
        };
        let (user, checker) = ticket.parts();

        self.login_app_user(checker, user).await?;

        let path = format!("/api/users/{}", user.id);
        checker
            .play(CheckAction {
                path,
                expected_status: Some(StatusCode::OK),
                description: "the user detail endpoint answers",
                check: Some(verify::check_json_full_user()),
                ..Default::default()
            })
            .await
    }

    /// The reserve/cancel state machine and all its invalid-input branches
    pub async fn check_reserve_sheet(&self) -> CheckResult<()> {
        let Some(mut user_ticket) = self.pool.pop_random_user() else {
            return Ok(());
        };
        let (user, checker) = user_ticket.parts();

        self.login_app_user(checker, user).await?;
        let user_id = user.id;

        let Some(mut sheet_ticket) = self.pop_or_create_event_sheet().await? else {
            return Ok(());
        };
        let event_id = sheet_ticket.sheet().event_id;
        let rank = sheet_ticket.sheet().rank.clone();

        // no-reservation -> committed -> canceled
        let reserved = self
            .reserve_sheet(checker, user_id, sheet_ticket.sheet_mut())
            .await?;
        self.cancel_sheet(checker, sheet_ticket.sheet_mut(), &reserved)
            .await?;

        checker
            .play(CheckAction {
                method: HttpMethod::Delete,
                path: format!(
                    "/api/events/{}/sheets/{}/{}/reservation",
                    event_id, reserved.sheet_rank, reserved.sheet_num
                ),
                expected_status: Some(StatusCode::BAD_REQUEST),
                description: "canceling an already-canceled reservation is rejected",
                check: Some(verify::check_json_error("not_reserved")),
                ..Default::default()
            })
            .await?;

        let unknown_event_id = 0;
        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: format!("/api/events/{}/actions/reserve", unknown_event_id),
                expected_status: Some(StatusCode::NOT_FOUND),
                description: "reserving in an unknown event is rejected",
                check: Some(verify::check_json_error("invalid_event")),
                post_json: Some(json!({ "sheet_rank": rank })),
                ..Default::default()
            })
            .await?;

        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: format!("/api/events/{}/actions/reserve", event_id),
                expected_status: Some(StatusCode::BAD_REQUEST),
                description: "reserving an unknown rank is rejected",
                check: Some(verify::check_json_error("invalid_rank")),
                post_json: Some(json!({ "sheet_rank": "N" })),
                ..Default::default()
            })
            .await?;

        let random_num = self.random_sheet_num(&rank);
        checker
            .play(CheckAction {
                method: HttpMethod::Delete,
                path: format!(
                    "/api/events/{}/sheets/{}/{}/reservation",
                    unknown_event_id, rank, random_num
                ),
                expected_status: Some(StatusCode::NOT_FOUND),
                description: "canceling in an unknown event is rejected",
                check: Some(verify::check_json_error("invalid_event")),
                ..Default::default()
            })
            .await?;

        checker
            .play(CheckAction {
                method: HttpMethod::Delete,
                path: format!(
                    "/api/events/{}/sheets/{}/{}/reservation",
                    event_id, "D", random_num
                ),
                expected_status: Some(StatusCode::NOT_FOUND),
                description: "canceling an unknown rank is rejected",
                check: Some(verify::check_json_error("invalid_rank")),
                ..Default::default()
            })
            .await?;

        let first_kind = self
            .ledger
            .sheet_kinds()
            .first()
            .cloned()
            .ok_or_else(|| fatal!("dataset has no sheet kinds"))?;
        let unknown_num = 1 + first_kind.total + self.rng.pick(first_kind.total as usize) as u64;
        checker
            .play(CheckAction {
                method: HttpMethod::Delete,
                path: format!(
                    "/api/events/{}/sheets/{}/{}/reservation",
                    event_id, first_kind.rank, unknown_num
                ),
                expected_status: Some(StatusCode::NOT_FOUND),
                description: "canceling an unknown seat is rejected",
                check: Some(verify::check_json_error("invalid_sheet")),
                ..Default::default()
            })
            .await?;

        // Mutating calls without a session must be rejected
        let anonymous = self.pool.new_checker()?;

        anonymous
            .play(CheckAction {
                method: HttpMethod::Post,
                path: format!("/api/events/{}/actions/reserve", event_id),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                description: "reserving without a session is rejected",
                check: Some(verify::check_json_error("login_required")),
                post_json: Some(json!({ "sheet_rank": rank })),
                ..Default::default()
            })
            .await?;

        anonymous
            .play(CheckAction {
                method: HttpMethod::Delete,
                path: format!(
                    "/api/events/{}/sheets/{}/{}/reservation",
                    event_id, rank, random_num
                ),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                description: "canceling without a session is rejected",
                check: Some(verify::check_json_error("login_required")),
                ..Default::default()
            })
            .await?;

        Ok(())
    }

    /// Event creation, visibility and edit flow with all authorization branches
    pub async fn check_create_event(&self) -> CheckResult<()> {
        let anonymous = self.pool.new_checker()?;

        let Some(mut admin_ticket) = self.pool.pop_random_administrator() else {
            return Ok(());
        };
        let (admin, admin_checker) = admin_ticket.parts();

        let Some(mut user_ticket) = self.pool.pop_random_user() else {
            return Ok(());
        };
        let (user, user_checker) = user_ticket.parts();

        self.login_administrator(admin_checker, admin, None).await?;
        self.login_app_user(user_checker, user).await?;

        let (event, publish) = self.pool.create_new_event();

        user_checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/admin/api/events".to_string(),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                description: "an ordinary user cannot create an event",
                post_json: Some(event_post_json(&event.snapshot())),
                check: Some(verify::check_json_error("admin_login_required")),
                ..Default::default()
            })
            .await?;

        // Created private first, published to the world via the edit below
        event.set_public(false);

        admin_checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/admin/api/events".to_string(),
                expected_status: Some(StatusCode::OK),
                description: "an administrator can create an event",
                post_json: Some(event_post_json(&event.snapshot())),
                check: Some(verify::check_json_full_event_create(event.clone())),
                ..Default::default()
            })
            .await?;
        let event_id = event.id();
        publish.publish("check-create-event");

        anonymous
            .play(CheckAction {
                path: format!("/api/events/{}", event_id),
                expected_status: Some(StatusCode::NOT_FOUND),
                description: "a private event is invisible to the public API",
                check: Some(verify::check_json_error("not_found")),
                ..Default::default()
            })
            .await?;

        user_checker
            .play(CheckAction {
                path: format!("/admin/api/events/{}", event_id),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                description: "an ordinary user cannot use the admin event API",
                check: Some(verify::check_json_error("admin_login_required")),
                ..Default::default()
            })
            .await?;

        admin_checker
            .play(CheckAction {
                path: format!("/admin/api/events/{}", event_id),
                expected_status: Some(StatusCode::OK),
                description: "an administrator can fetch a private event",
                check: Some(verify::check_json_full_event(event.clone())),
                ..Default::default()
            })
            .await?;

        user_checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: format!("/admin/api/events/{}/actions/edit", event_id),
                expected_status: Some(StatusCode::UNAUTHORIZED),
                description: "an ordinary user cannot edit an event",
                post_json: Some(event_post_json(&event.snapshot())),
                check: Some(verify::check_json_error("admin_login_required")),
                ..Default::default()
            })
            .await?;

        // Publish the event
        event.set_public(true);

        admin_checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: format!("/admin/api/events/{}/actions/edit", event_id),
                expected_status: Some(StatusCode::OK),
                description: "an administrator can edit an event",
                post_json: Some(event_edit_json(&event.snapshot())),
                check: Some(verify::check_json_full_event(event.clone())),
                ..Default::default()
            })
            .await?;

        anonymous
            .play(CheckAction {
                path: format!("/api/events/{}", event_id),
                expected_status: Some(StatusCode::OK),
                description: "a published event is visible to the public API",
                check: Some(verify::check_json_event(event.clone())),
                ..Default::default()
            })
            .await?;

        admin_checker
            .play(CheckAction {
                path: format!("/admin/api/events/{}", event_id),
                expected_status: Some(StatusCode::OK),
                description: "an administrator can fetch a published event",
                check: Some(verify::check_json_full_event(event.clone())),
                ..Default::default()
            })
            .await?;

        admin_checker
            .play(CheckAction {
                path: format!("/admin/api/events/{}", event_id + 1),
                expected_status: Some(StatusCode::NOT_FOUND),
                description: "fetching a nonexistent event fails",
                check: Some(verify::check_json_error("not_found")),
                ..Default::default()
            })
            .await?;

        admin_checker
            .play(CheckAction {
                path: format!("/api/events/{}", event_id + 1),
                expected_status: Some(StatusCode::NOT_FOUND),
                description: "fetching a nonexistent event fails",
                check: Some(verify::check_json_error("not_found")),
                ..Default::default()
            })
            .await?;

        admin_checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: format!("/admin/api/events/{}/actions/edit", event_id + 1),
                expected_status: Some(StatusCode::NOT_FOUND),
                description: "editing a nonexistent event fails",
                post_json: Some(event_post_json(&event.snapshot())),
                check: Some(verify::check_json_error("not_found")),
                ..Default::default()
            })
            .await?;

        Ok(())
    }

    /// Full sales report reconciliation against the ledger
    pub async fn check_report(&self) -> CheckResult<()> {
        let Some(mut ticket) = self.pool.pop_random_administrator() else {
            return Ok(());
        };
        let (admin, checker) = ticket.parts();

        self.login_administrator(checker, admin, Some(self.report_login_timeout))
            .await?;

        let time_before = self.ledger.delay_threshold();
        let before = self.ledger.reservations_settled_before(time_before);

        checker
            .play(CheckAction {
                path: "/admin/api/reports/sales".to_string(),
                expected_status: Some(StatusCode::OK),
                description: "the sales report reconciles with the ledger",
                check: Some(report::check_report(
                    self.ledger.clone(),
                    time_before,
                    before,
                )),
                timeout: Some(self.report_timeout),
                ..Default::default()
            })
            .await
    }

    /// Per-event sales report reconciliation
    pub async fn check_event_report(&self) -> CheckResult<()> {
        let Some(mut ticket) = self.pool.pop_random_administrator() else {
            return Ok(());
        };
        let (admin, checker) = ticket.parts();

        self.login_administrator(checker, admin, None).await?;

        let Some(event) = self.ledger.random_public_event(&self.rng) else {
            return Ok(());
        };
        let event_id = event.id();

        let time_before = self.ledger.delay_threshold();
        let before = self.ledger.reservations_settled_before(time_before);
        let before = before
            .into_iter()
            .filter(|(_, r)| r.event_id == event_id)
            .collect();

        checker
            .play(CheckAction {
                path: format!("/admin/api/reports/events/{}/sales", event_id),
                expected_status: Some(StatusCode::OK),
                description: "the per-event sales report reconciles with the ledger",
                check: Some(report::check_event_report(
                    self.ledger.clone(),
                    event_id,
                    time_before,
                    before,
                )),
                ..Default::default()
            })
            .await
    }

    /// Static assets byte-for-byte against the dataset checksums
    pub async fn check_static_files(&self) -> CheckResult<()> {
        let Some(mut ticket) = self.pool.pop_random_user() else {
            return Ok(());
        };
        let (_user, checker) = ticket.parts();

        for file in self.ledger.static_files().to_vec() {
            let path = file.path.clone();
            checker
                .play(CheckAction {
                    path,
                    expected_status: Some(StatusCode::OK),
                    description: "a static file matches its checksum",
                    check: Some(verify::check_static_file_content(file)),
                    ..Default::default()
                })
                .await?;
        }

        Ok(())
    }
}
