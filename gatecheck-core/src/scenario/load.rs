//! Load scenario variants: best-effort traffic with minimal assertions

use super::Harness;
use crate::verify;
use gatecheck_http::{CheckAction, CheckResult, HttpMethod, StatusCode};
use serde_json::json;
use tracing::warn;

impl Harness {
    /// Register a fresh account and log in with it
    pub async fn load_create_user(&self) -> CheckResult<()> {
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
                ..Default::default()
            })
            .await?;

        user.online = true;
        ticket.publish();
        Ok(())
    }

    /// Users hammer refresh on the top page waiting for events to open
    pub async fn load_top_page(&self) -> CheckResult<()> {
        let Some(mut ticket) = self.pool.pop_random_user() else {
            return Ok(());
        };
        let (_user, checker) = ticket.parts();

        self.spawn_asset_loads(checker);

        // The check variant inspects the page; here rendering is enough
        checker
            .play(CheckAction {
                path: "/".to_string(),
                expected_status: Some(StatusCode::OK),
                description: "the top page renders",
                ..Default::default()
            })
            .await
    }

    pub async fn load_admin_top_page(&self) -> CheckResult<()> {
        let Some(mut ticket) = self.pool.pop_random_administrator() else {
            return Ok(());
        };
        let (_admin, checker) = ticket.parts();

        self.spawn_asset_loads(checker);

        checker
            .play(CheckAction {
                path: "/admin/".to_string(),
                expected_status: Some(StatusCode::OK),
                description: "the admin top page renders",
                ..Default::default()
            })
            .await
    }

    pub async fn load_my_page(&self) -> CheckResult<()> {
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
                description: "the user detail page loads",
                ..Default::default()
            })
            .await
    }

    /// Seats are assigned randomly within a rank, so some users reserve and
    /// cancel repeatedly hunting for a good one
    pub async fn load_reserve_cancel_sheet(&self) -> CheckResult<()> {
        let Some(mut sheet_ticket) = self.pop_or_create_event_sheet().await? else {
            return Ok(());
        };
        let Some(mut user_ticket) = self.pool.pop_random_user() else {
            return Ok(());
        };
        let (user, checker) = user_ticket.parts();

        self.login_app_user(checker, user).await?;
        let user_id = user.id;

        let reserved = self
            .reserve_sheet(checker, user_id, sheet_ticket.sheet_mut())
            .await?;
        self.cancel_sheet(checker, sheet_ticket.sheet_mut(), &reserved)
            .await?;

        Ok(())
    }

    pub async fn load_reserve_sheet(&self) -> CheckResult<()> {
        let Some(mut sheet_ticket) = self.pop_or_create_event_sheet().await? else {
            return Ok(());
        };
        let Some(mut user_ticket) = self.pool.pop_random_user() else {
            return Ok(());
        };
        let (user, checker) = user_ticket.parts();

        self.login_app_user(checker, user).await?;
        let user_id = user.id;

        self.reserve_sheet(checker, user_id, sheet_ticket.sheet_mut())
            .await?;

        Ok(())
    }

    pub async fn load_get_event(&self) -> CheckResult<()> {
        let Some(event) = self.ledger.random_public_sold_out_event(&self.rng) else {
            warn!("no public sold-out event available, skipping");
            return Ok(());
        };
        let Some(mut ticket) = self.pool.pop_random_user() else {
            return Ok(());
        };
        let (user, checker) = ticket.parts();

        self.login_app_user(checker, user).await?;

        let path = format!("/api/events/{}", event.id());
        checker
            .play(CheckAction {
                path,
                expected_status: Some(StatusCode::OK),
                description: "a public event can be fetched",
                check: Some(verify::check_json_event(event)),
                ..Default::default()
            })
            .await
    }

    /// Pull the full sales report to put pressure on the export path; the
    /// check variant does the reconciliation
    pub async fn load_report(&self) -> CheckResult<()> {
        let Some(mut ticket) = self.pool.pop_random_administrator() else {
            return Ok(());
        };
        let (admin, checker) = ticket.parts();

        self.login_administrator(checker, admin, Some(self.report_login_timeout))
            .await?;

        checker
            .play(CheckAction {
                path: "/admin/api/reports/sales".to_string(),
                expected_status: Some(StatusCode::OK),
                description: "the sales report downloads",
                timeout: Some(self.report_timeout),
                ..Default::default()
            })
            .await
    }

    /// Per-event report: lets the service take its reservation locks while
    /// reserve/cancel traffic runs against the same event
    pub async fn load_event_report(&self) -> CheckResult<()> {
        let Some(mut ticket) = self.pool.pop_random_administrator() else {
            return Ok(());
        };
        let (admin, checker) = ticket.parts();

        self.login_administrator(checker, admin, None).await?;

        // Closed events see no reserve/cancel traffic, so they are skipped
        let Some(event) = self.ledger.random_public_event(&self.rng) else {
            return Ok(());
        };

        let path = format!("/admin/api/reports/events/{}/sales", event.id());
        checker
            .play(CheckAction {
                path,
                expected_status: Some(StatusCode::OK),
                description: "the per-event sales report downloads",
                ..Default::default()
            })
            .await
    }
}
