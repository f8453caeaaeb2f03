//! Client side of the attendance toggle.
//!
//! The intranet pages flip "I will attend" locally before the network round
//! trip so the UI feels instantaneous, then reconcile against whatever the
//! server actually did. The server recomputes membership from the store and
//! reports the concrete action it performed; the client must apply that
//! reported action — never its own guess — and roll the optimistic flip back
//! entirely on any failure. A final list refetch makes concurrent writers
//! converge.

use async_trait::async_trait;
use serde::Deserialize;

use crate::db::models::{
    AttendAction, AttendOutcome, AttendRequest, EffectiveAction, EventMatch, EventView,
};
use crate::error::{AppError, AppResult};

/// Transport used by the toggle driver. Production talks HTTP; tests swap in
/// an in-memory fake.
#[async_trait]
pub trait EventsApi: Send + Sync {
    async fn toggle_attendance(&self, request: &AttendRequest) -> AppResult<AttendOutcome>;
    async fn list_events(&self) -> AppResult<Vec<EventView>>;
}

// ============================================================================
// Reconciliation state machine
// ============================================================================

/// Toggle lifecycle. `Pending` remembers the pre-flip membership so rollback
/// is an unconditional transition, not a conditionally remembered side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Idle,
    Pending { was_attending: bool },
}

pub struct AttendanceToggle {
    username: Option<String>,
    target: EventMatch,
    attending: bool,
    state: ToggleState,
}

impl AttendanceToggle {
    /// `username` comes from the display cookie and may be absent;
    /// `attending` is the membership currently shown for `target`.
    pub fn new(username: Option<String>, target: EventMatch, attending: bool) -> Self {
        AttendanceToggle {
            username,
            target,
            attending,
            state: ToggleState::Idle,
        }
    }

    pub fn attending(&self) -> bool {
        self.attending
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    /// Run one toggle round trip against `api`, returning the action the
    /// server reports. Local state always ends reconciled: either reflecting
    /// the server's answer or rolled back to the pre-flip membership.
    pub async fn toggle<A: EventsApi + ?Sized>(&mut self, api: &A) -> AppResult<EffectiveAction> {
        let username = match self
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        {
            Some(u) => u.to_string(),
            // No identity: no network call, no local mutation.
            None => return Err(AppError::Unauthorized("Usuario no identificado".to_string())),
        };

        // Optimistic flip before the round trip.
        let was_attending = self.attending;
        self.state = ToggleState::Pending { was_attending };
        self.attending = !was_attending;

        let request = AttendRequest {
            target: self.target.clone(),
            action: AttendAction::Toggle,
        };

        let outcome = match api.toggle_attendance(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.rollback();
                return Err(e);
            }
        };

        // Apply the action the server reports, not the local guess.
        self.attending = match outcome.action {
            EffectiveAction::Add => true,
            EffectiveAction::Remove => false,
            EffectiveAction::Noop => was_attending,
        };
        self.state = ToggleState::Idle;

        // Refetch the list so state written by other members converges too.
        // The toggle itself already succeeded; a failed refetch only means we
        // keep the server-reported membership.
        match api.list_events().await {
            Ok(events) => {
                if let Some(view) = events.iter().find(|v| self.target.matches_view(v)) {
                    self.attending = view.attendees.iter().any(|a| a == &username);
                }
            }
            Err(e) => tracing::debug!("attendance refetch failed: {:?}", e),
        }

        Ok(outcome.action)
    }

    fn rollback(&mut self) {
        if let ToggleState::Pending { was_attending } = self.state {
            self.attending = was_attending;
        }
        self.state = ToggleState::Idle;
    }
}

// ============================================================================
// HTTP transport
// ============================================================================

/// `EventsApi` over HTTP against a running server. Carries the committee
/// session cookies in its cookie store after a successful `login`.
pub struct HttpEventsApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEventsApi {
    pub fn new(base_url: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(HttpEventsApi {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Log in as a committee member. The server answers with a redirect
    /// either way; a failed attempt lands back on the login page with an
    /// error flag in the query string.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<()> {
        let res = self
            .client
            .post(format!("{}/api/login", self.base_url))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        if res.url().query().unwrap_or("").contains("error=1") {
            return Err(AppError::Unauthorized(
                "Usuario o contraseña incorrectos".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Deserialize)]
struct EventsEnvelope {
    events: Vec<EventView>,
}

async fn error_from_response(res: reqwest::Response) -> AppError {
    let status = res.status();
    let message = res
        .json::<ErrorEnvelope>()
        .await
        .map(|e| e.error.message)
        .unwrap_or_else(|_| status.to_string());

    if status == reqwest::StatusCode::UNAUTHORIZED {
        AppError::Unauthorized(message)
    } else if status == reqwest::StatusCode::NOT_FOUND {
        AppError::NotFound(message)
    } else {
        AppError::BadRequest(message)
    }
}

#[async_trait]
impl EventsApi for HttpEventsApi {
    async fn toggle_attendance(&self, request: &AttendRequest) -> AppResult<AttendOutcome> {
        let res = self
            .client
            .post(format!("{}/api/events/attend", self.base_url))
            .json(request)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }
        Ok(res.json().await?)
    }

    async fn list_events(&self) -> AppResult<Vec<EventView>> {
        let res = self
            .client
            .get(format!("{}/api/events", self.base_url))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }
        Ok(res.json::<EventsEnvelope>().await?.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const USER: &str = "Alba";

    /// One-event fake server. Holds the authoritative attendee set and can be
    /// told to fail, to answer without mutating, or to fail only the refetch.
    struct FakeApi {
        attendees: Mutex<Vec<String>>,
        toggle_calls: AtomicUsize,
        fail_toggle: bool,
        forced_action: Option<EffectiveAction>,
        fail_refetch: bool,
    }

    impl FakeApi {
        fn with_attendees(attendees: &[&str]) -> Self {
            FakeApi {
                attendees: Mutex::new(attendees.iter().map(|s| s.to_string()).collect()),
                toggle_calls: AtomicUsize::new(0),
                fail_toggle: false,
                forced_action: None,
                fail_refetch: false,
            }
        }

        fn membership(&self) -> bool {
            self.attendees.lock().unwrap().iter().any(|a| a == USER)
        }

        fn view(&self) -> EventView {
            EventView {
                id: 1,
                title: "Ofrenda".to_string(),
                img: String::new(),
                description: String::new(),
                location: String::new(),
                provisional: false,
                attendees: self.attendees.lock().unwrap().clone(),
                tags: vec![],
                starts_at: "2025-09-16T18:00:00Z".parse().unwrap(),
                date: "2025-09-16".to_string(),
                time: "20:00".to_string(),
            }
        }
    }

    #[async_trait]
    impl EventsApi for FakeApi {
        async fn toggle_attendance(&self, _request: &AttendRequest) -> AppResult<AttendOutcome> {
            self.toggle_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_toggle {
                return Err(AppError::BadRequest("boom".to_string()));
            }
            if let Some(action) = self.forced_action {
                return Ok(AttendOutcome { ok: true, action });
            }

            let mut attendees = self.attendees.lock().unwrap();
            let action = if attendees.iter().any(|a| a == USER) {
                attendees.retain(|a| a != USER);
                EffectiveAction::Remove
            } else {
                attendees.push(USER.to_string());
                EffectiveAction::Add
            };
            Ok(AttendOutcome { ok: true, action })
        }

        async fn list_events(&self) -> AppResult<Vec<EventView>> {
            if self.fail_refetch {
                return Err(AppError::BadRequest("offline".to_string()));
            }
            Ok(vec![self.view()])
        }
    }

    fn toggle_for(api: &FakeApi) -> AttendanceToggle {
        AttendanceToggle::new(
            Some(USER.to_string()),
            EventMatch::by_id(1),
            api.membership(),
        )
    }

    #[tokio::test]
    async fn repeated_toggles_converge_with_the_server() {
        let api = FakeApi::with_attendees(&[]);
        let mut toggle = toggle_for(&api);

        for _ in 0..5 {
            toggle.toggle(&api).await.unwrap();
            assert_eq!(toggle.attending(), api.membership());
            assert_eq!(toggle.state(), ToggleState::Idle);
        }
    }

    #[tokio::test]
    async fn unidentified_user_makes_no_call_and_no_mutation() {
        let api = FakeApi::with_attendees(&[]);
        let mut toggle = AttendanceToggle::new(None, EventMatch::by_id(1), false);

        let err = toggle.toggle(&api).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert_eq!(api.toggle_calls.load(Ordering::SeqCst), 0);
        assert!(!toggle.attending());
        assert_eq!(toggle.state(), ToggleState::Idle);

        // A blank username counts as unidentified too.
        let mut toggle =
            AttendanceToggle::new(Some("  ".to_string()), EventMatch::by_id(1), true);
        assert!(toggle.toggle(&api).await.is_err());
        assert_eq!(api.toggle_calls.load(Ordering::SeqCst), 0);
        assert!(toggle.attending());
    }

    #[tokio::test]
    async fn transport_error_rolls_the_flip_back() {
        let mut api = FakeApi::with_attendees(&[USER]);
        api.fail_toggle = true;
        let mut toggle = toggle_for(&api);

        assert!(toggle.toggle(&api).await.is_err());
        assert!(toggle.attending());
        assert_eq!(toggle.state(), ToggleState::Idle);
    }

    #[tokio::test]
    async fn noop_answer_rolls_the_flip_back() {
        let mut api = FakeApi::with_attendees(&[]);
        api.forced_action = Some(EffectiveAction::Noop);
        api.fail_refetch = true; // isolate the reported action from the refetch
        let mut toggle = toggle_for(&api);

        let action = toggle.toggle(&api).await.unwrap();
        assert_eq!(action, EffectiveAction::Noop);
        assert!(!toggle.attending());
    }

    #[tokio::test]
    async fn server_reported_action_beats_the_local_guess() {
        // Client believes it is not attending, but the server still has the
        // name: the toggle removes it. The local guess (add) must lose.
        let api = FakeApi::with_attendees(&[USER]);
        let mut toggle = AttendanceToggle::new(
            Some(USER.to_string()),
            EventMatch::by_id(1),
            false,
        );

        let action = toggle.toggle(&api).await.unwrap();
        assert_eq!(action, EffectiveAction::Remove);
        assert!(!toggle.attending());
        assert_eq!(toggle.attending(), api.membership());
    }

    #[tokio::test]
    async fn failed_refetch_keeps_the_reported_membership() {
        let mut api = FakeApi::with_attendees(&[]);
        api.fail_refetch = true;
        let mut toggle = toggle_for(&api);

        let action = toggle.toggle(&api).await.unwrap();
        assert_eq!(action, EffectiveAction::Add);
        assert!(toggle.attending());
    }
}
