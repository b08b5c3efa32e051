//! Scenario orchestration
//!
//! Scenarios compose the pool, the player and the verifiers into end-to-end
//! actor behaviors. Each comes in two flavors: a `load_*` variant generating
//! best-effort traffic with minimal assertions, and a `check_*` variant
//! asserting every reachable error and success path of one capability.
//!
//! A scenario pops the resources it needs, plays a sequence of actions,
//! verifies each, and returns the resources through ticket drops. The first
//! error aborts that scenario instance only; concurrent instances are
//! unaffected.

mod check;
mod load;

use crate::counter::Counters;
use crate::dataset::Dataset;
use crate::ledger::Ledger;
use crate::model::{
    Actor, EventSheet, EventState, JsonReservation, PendingReservation, Reservation,
    NON_RESERVED_NUM,
};
use crate::pool::{Pool, SheetTicket};
use crate::random::RandomSource;
use crate::verify;
use gatecheck_config::GatecheckConfig;
use gatecheck_http::{
    fatal, CheckAction, CheckError, CheckResult, Checker, HttpConfig, HttpMethod, StatusCode,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// All scenario variants the external driver can schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    LoadCreateUser,
    LoadTopPage,
    LoadAdminTopPage,
    LoadMyPage,
    LoadReserveCancelSheet,
    LoadReserveSheet,
    LoadGetEvent,
    LoadReport,
    LoadEventReport,
    CheckCreateUser,
    CheckLogin,
    CheckAdminLogin,
    CheckTopPage,
    CheckMyPage,
    CheckReserveSheet,
    CheckCreateEvent,
    CheckReport,
    CheckEventReport,
    CheckStaticFiles,
}

impl ScenarioKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::LoadCreateUser => "load-create-user",
            ScenarioKind::LoadTopPage => "load-top-page",
            ScenarioKind::LoadAdminTopPage => "load-admin-top-page",
            ScenarioKind::LoadMyPage => "load-my-page",
            ScenarioKind::LoadReserveCancelSheet => "load-reserve-cancel-sheet",
            ScenarioKind::LoadReserveSheet => "load-reserve-sheet",
            ScenarioKind::LoadGetEvent => "load-get-event",
            ScenarioKind::LoadReport => "load-report",
            ScenarioKind::LoadEventReport => "load-event-report",
            ScenarioKind::CheckCreateUser => "check-create-user",
            ScenarioKind::CheckLogin => "check-login",
            ScenarioKind::CheckAdminLogin => "check-admin-login",
            ScenarioKind::CheckTopPage => "check-top-page",
            ScenarioKind::CheckMyPage => "check-my-page",
            ScenarioKind::CheckReserveSheet => "check-reserve-sheet",
            ScenarioKind::CheckCreateEvent => "check-create-event",
            ScenarioKind::CheckReport => "check-report",
            ScenarioKind::CheckEventReport => "check-event-report",
            ScenarioKind::CheckStaticFiles => "check-static-files",
        }
    }

    /// Default scheduling mix: load variants dominate, check variants are
    /// sprinkled in to keep every path covered
    pub fn weighted() -> &'static [(ScenarioKind, u32)] {
        &[
            (ScenarioKind::LoadTopPage, 5),
            (ScenarioKind::LoadMyPage, 3),
            (ScenarioKind::LoadReserveCancelSheet, 6),
            (ScenarioKind::LoadReserveSheet, 4),
            (ScenarioKind::LoadGetEvent, 3),
            (ScenarioKind::LoadCreateUser, 2),
            (ScenarioKind::LoadAdminTopPage, 1),
            (ScenarioKind::LoadEventReport, 2),
            (ScenarioKind::LoadReport, 1),
            (ScenarioKind::CheckCreateUser, 1),
            (ScenarioKind::CheckLogin, 1),
            (ScenarioKind::CheckAdminLogin, 1),
            (ScenarioKind::CheckTopPage, 1),
            (ScenarioKind::CheckMyPage, 1),
            (ScenarioKind::CheckReserveSheet, 1),
            (ScenarioKind::CheckCreateEvent, 1),
            (ScenarioKind::CheckEventReport, 1),
            (ScenarioKind::CheckStaticFiles, 1),
        ]
    }
}

/// Composes pool, player and verifiers into runnable scenarios
pub struct Harness {
    ledger: Arc<Ledger>,
    pool: Pool,
    rng: RandomSource,
    counters: Arc<dyn Counters>,
    report_timeout: Duration,
    report_login_timeout: Duration,
}

impl Harness {
    /// Build the harness; the randomness source is taken from the config seed
    pub fn new(
        dataset: &Dataset,
        config: &GatecheckConfig,
        counters: Arc<dyn Counters>,
    ) -> CheckResult<Self> {
        let rng = match config.load.seed {
            Some(seed) => RandomSource::seeded(seed),
            None => RandomSource::new(),
        };
        Self::with_random_source(dataset, config, counters, rng)
    }

    /// Build the harness with an explicit randomness source
    pub fn with_random_source(
        dataset: &Dataset,
        config: &GatecheckConfig,
        counters: Arc<dyn Counters>,
        rng: RandomSource,
    ) -> CheckResult<Self> {
        let base_url =
            Url::parse(&config.target.base_url).map_err(|source| CheckError::InvalidPath {
                path: config.target.base_url.clone(),
                source,
            })?;
        let ledger = Arc::new(Ledger::new(dataset, config.target.allowable_delay));
        let pool = Pool::new(
            ledger.clone(),
            dataset,
            base_url,
            HttpConfig::from(config.http.clone()),
            rng.clone(),
        )?;
        Ok(Self {
            ledger,
            pool,
            rng,
            counters,
            report_timeout: config.target.report_timeout,
            report_login_timeout: config.target.report_login_timeout,
        })
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Run one scenario instance
    pub async fn run(&self, kind: ScenarioKind) -> CheckResult<()> {
        match kind {
            ScenarioKind::LoadCreateUser => self.load_create_user().await,
            ScenarioKind::LoadTopPage => self.load_top_page().await,
            ScenarioKind::LoadAdminTopPage => self.load_admin_top_page().await,
            ScenarioKind::LoadMyPage => self.load_my_page().await,
            ScenarioKind::LoadReserveCancelSheet => self.load_reserve_cancel_sheet().await,
            ScenarioKind::LoadReserveSheet => self.load_reserve_sheet().await,
            ScenarioKind::LoadGetEvent => self.load_get_event().await,
            ScenarioKind::LoadReport => self.load_report().await,
            ScenarioKind::LoadEventReport => self.load_event_report().await,
            ScenarioKind::CheckCreateUser => self.check_create_user().await,
            ScenarioKind::CheckLogin => self.check_login().await,
            ScenarioKind::CheckAdminLogin => self.check_admin_login().await,
            ScenarioKind::CheckTopPage => self.check_top_page().await,
            ScenarioKind::CheckMyPage => self.check_my_page().await,
            ScenarioKind::CheckReserveSheet => self.check_reserve_sheet().await,
            ScenarioKind::CheckCreateEvent => self.check_create_event().await,
            ScenarioKind::CheckReport => self.check_report().await,
            ScenarioKind::CheckEventReport => self.check_event_report().await,
            ScenarioKind::CheckStaticFiles => self.check_static_files().await,
        }
    }

    // Shared building blocks

    /// Log a user in unless the session is already online
    pub(crate) async fn login_app_user(
        &self,
        checker: &Checker,
        user: &mut Actor,
    ) -> CheckResult<()> {
        if user.online {
            return Ok(());
        }

        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/api/actions/login".to_string(),
                expected_status: Some(StatusCode::OK),
                post_json: Some(json!({
                    "login_name": user.login_name,
                    "password": user.password,
                })),
                description: "a registered user can log in",
                check: Some(verify::check_json_user(user)),
                ..Default::default()
            })
            .await?;

        user.online = true;
        Ok(())
    }

    pub(crate) async fn logout_app_user(
        &self,
        checker: &Checker,
        user: &mut Actor,
    ) -> CheckResult<()> {
        if !user.online {
            return Ok(());
        }

        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/api/actions/logout".to_string(),
                expected_status: Some(StatusCode::NO_CONTENT),
                description: "a logged-in user can log out",
                ..Default::default()
            })
            .await?;

        user.online = false;
        Ok(())
    }

    /// Log an administrator in, optionally with a longer timeout for the
    /// post-test report phase
    pub(crate) async fn login_administrator(
        &self,
        checker: &Checker,
        admin: &mut Actor,
        timeout: Option<Duration>,
    ) -> CheckResult<()> {
        if admin.online {
            return Ok(());
        }

        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/admin/api/actions/login".to_string(),
                expected_status: Some(StatusCode::OK),
                post_json: Some(json!({
                    "login_name": admin.login_name,
                    "password": admin.password,
                })),
                description: "an administrator can log in",
                check: Some(verify::check_json_administrator(admin)),
                timeout,
                ..Default::default()
            })
            .await?;

        admin.online = true;
        Ok(())
    }

    pub(crate) async fn logout_administrator(
        &self,
        checker: &Checker,
        admin: &mut Actor,
    ) -> CheckResult<()> {
        if !admin.online {
            return Ok(());
        }

        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/admin/api/actions/logout".to_string(),
                expected_status: Some(StatusCode::NO_CONTENT),
                description: "an administrator can log out",
                ..Default::default()
            })
            .await?;

        admin.online = false;
        Ok(())
    }

    /// Pop a probe slot, creating and publishing a fresh event when the pool
    /// ran dry
    ///
    /// Creation is guarded by the non-blocking gate: a second task finding
    /// the pool empty backs off immediately rather than queueing, since the
    /// winner's publish refills the pool shortly.
    pub(crate) async fn pop_or_create_event_sheet(&self) -> CheckResult<Option<SheetTicket>> {
        if let Some(ticket) = self.pool.pop_event_sheet() {
            return Ok(Some(ticket));
        }

        let Some(_guard) = self.pool.try_begin_event_creation() else {
            debug!("another task is already creating a new event, backing off");
            return Ok(None);
        };

        let Some(mut admin) = self.pool.pop_random_administrator() else {
            return Ok(None);
        };
        let (admin_actor, checker) = admin.parts();
        self.login_administrator(checker, admin_actor, None).await?;

        let (event, publish) = self.pool.create_new_event();
        checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: "/admin/api/events".to_string(),
                expected_status: Some(StatusCode::OK),
                post_json: Some(event_post_json(&event.snapshot())),
                description: "an administrator can create an event",
                check: Some(verify::check_json_full_event_create(event.clone())),
                ..Default::default()
            })
            .await?;
        publish.publish("sheet pool was empty");

        Ok(self.pool.pop_event_sheet())
    }

    /// Reserve the probed sheet, bracketing the call with the reserve log and
    /// committing the result into the ledger
    pub(crate) async fn reserve_sheet(
        &self,
        checker: &Checker,
        user_id: u64,
        sheet: &mut EventSheet,
    ) -> CheckResult<JsonReservation> {
        let mut reserved = JsonReservation {
            reservation_id: 0,
            sheet_rank: sheet.rank.clone(),
            sheet_num: 0,
        };

        let log_id = self.ledger.append_reserve_log(PendingReservation {
            event_id: sheet.event_id,
            user_id,
            sheet_rank: sheet.rank.clone(),
        });

        let played = checker
            .play(CheckAction {
                method: HttpMethod::Post,
                path: format!("/api/events/{}/actions/reserve", sheet.event_id),
                expected_status: Some(StatusCode::ACCEPTED),
                post_json: Some(json!({ "sheet_rank": sheet.rank })),
                description: "a seat can be reserved",
                check: Some(verify::check_json_reservation(&mut reserved)),
                ..Default::default()
            })
            .await;

        if let Err(err) = played {
            self.ledger.delete_reserve_log(log_id);
            return Err(err);
        }

        let reservation = Arc::new(Reservation::new(
            reserved.reservation_id,
            sheet.event_id,
            user_id,
            reserved.sheet_rank.clone(),
            reserved.sheet_num,
        ));
        let committed = self.ledger.commit_reservation(reservation);
        // The log entry covers exactly the in-flight window: the ledger is
        // updated first, then the entry goes away.
        self.ledger.delete_reserve_log(log_id);
        committed?;

        sheet.num = reserved.sheet_num;

        let event = self
            .ledger
            .find_event_by_id(sheet.event_id)
            .ok_or_else(|| fatal!("event {} vanished from the ledger", sheet.event_id))?;
        event.commit_reserve();

        Ok(reserved)
    }

    /// Cancel a committed reservation, bracketing the call with the cancel log
    pub(crate) async fn cancel_sheet(
        &self,
        checker: &Checker,
        sheet: &mut EventSheet,
        reserved: &JsonReservation,
    ) -> CheckResult<()> {
        let reservation = self
            .ledger
            .begin_cancel_reservation(reserved.reservation_id)?;

        let log_id = self.ledger.append_cancel_log(PendingReservation {
            event_id: reservation.event_id,
            user_id: reservation.user_id,
            sheet_rank: reservation.sheet_rank.clone(),
        });

        let played = checker
            .play(CheckAction {
                method: HttpMethod::Delete,
                path: format!(
                    "/api/events/{}/sheets/{}/{}/reservation",
                    sheet.event_id, reserved.sheet_rank, reserved.sheet_num
                ),
                expected_status: Some(StatusCode::NO_CONTENT),
                description: "a reservation can be canceled",
                ..Default::default()
            })
            .await;

        if let Err(err) = played {
            self.ledger.delete_cancel_log(log_id);
            return Err(err);
        }

        self.ledger.commit_cancel_reservation(&reservation);
        self.ledger.delete_cancel_log(log_id);

        sheet.num = NON_RESERVED_NUM;

        let event = self
            .ledger
            .find_event_by_id(sheet.event_id)
            .ok_or_else(|| fatal!("event {} vanished from the ledger", sheet.event_id))?;
        event.commit_cancel();

        Ok(())
    }

    /// Fire-and-forget fetches of all static assets through this session
    ///
    /// Failures are logged, never joined, and never fail the parent scenario.
    pub(crate) fn spawn_asset_loads(&self, checker: &Checker) {
        for file in self.ledger.static_files() {
            let checker = checker.clone();
            let counters = self.counters.clone();
            let path = file.path.clone();
            tokio::spawn(async move {
                let result = checker
                    .play(CheckAction {
                        method: HttpMethod::Get,
                        path: path.clone(),
                        enable_cache: true,
                        description: "a static file can be fetched",
                        check: Some(verify::count_static_file_status(counters)),
                        ..Default::default()
                    })
                    .await;
                if let Err(err) = result {
                    warn!("background asset load of {} failed: {}", path, err);
                }
            });
        }
    }

    /// A plausible seat number for the given rank
    pub(crate) fn random_sheet_num(&self, rank: &str) -> u64 {
        match self.ledger.sheet_kind_by_rank(rank) {
            Some(kind) => 1 + self.rng.pick(kind.total as usize) as u64,
            None => 1,
        }
    }
}

pub(crate) fn event_post_json(event: &EventState) -> serde_json::Value {
    json!({
        "title": event.title,
        "public": event.public,
        "price": event.price,
    })
}

pub(crate) fn event_edit_json(event: &EventState) -> serde_json::Value {
    json!({ "public": event.public })
}
