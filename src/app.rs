use axum::{
    Json, Router,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::sheets::SheetsBackend;
use crate::view::{Dashboard, ScheduleView, UiSession};

const SESSION_COOKIE: &str = "oa_session";
const SESSION_IDLE_LIMIT: Duration = Duration::from_secs(12 * 60 * 60);

struct StoredSession {
    ui: UiSession,
    last_seen: SystemTime,
}

/// Shared state of the web application
pub struct AppState<B> {
    dashboard: Dashboard<B>,
    sessions: Mutex<HashMap<String, StoredSession>>,
}

impl<B: SheetsBackend> AppState<B> {
    pub fn new(dashboard: Dashboard<B>) -> Self {
        AppState {
            dashboard,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn dashboard(&self) -> &Dashboard<B> {
        &self.dashboard
    }

    /// Apply `update` to the session named by the cookie, creating it if needed
    ///
    /// Returns the (possibly new) cookie jar and a copy of the updated state.
    fn with_session<F>(&self, jar: CookieJar, update: F) -> (CookieJar, UiSession)
    where
        F: FnOnce(&mut UiSession),
    {
        let now = SystemTime::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());

        let known = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|id| sessions.contains_key(id));

        let (jar, id) = match known {
            Some(id) => (jar, id),
            None => {
                sessions.retain(|_, s| {
                    now.duration_since(s.last_seen).unwrap_or_default() < SESSION_IDLE_LIMIT
                });
                let id = Uuid::new_v4().to_string();
                debug!("new ui session {} ({} active)", id, sessions.len() + 1);
                sessions.insert(
                    id.clone(),
                    StoredSession {
                        ui: UiSession::default(),
                        last_seen: now,
                    },
                );
                let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
                    .path("/")
                    .http_only(true);
                (jar.add(cookie), id)
            }
        };

        match sessions.get_mut(&id) {
            Some(stored) => {
                update(&mut stored.ui);
                stored.last_seen = now;
                (jar, stored.ui.clone())
            }
            None => (jar, UiSession::default()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleQuery {
    /// Typed OA name; an empty value clears it
    pub name: Option<String>,
    /// Tab to peek
    pub tab: Option<String>,
}

impl ScheduleQuery {
    fn apply(self, ui: &mut UiSession) {
        if let Some(name) = self.name {
            ui.oa_name = name.trim().to_string();
        }
        if let Some(tab) = self.tab {
            ui.active_tab = Some(tab).filter(|t| !t.is_empty());
        }
    }
}

/// Build the router for a dashboard
pub fn router<B: SheetsBackend>(state: Arc<AppState<B>>) -> Router {
    Router::new()
        .route("/", get(serve_home))
        .route("/schedule", get(serve_schedule::<B>))
        .route("/schedule/hours/refresh", post(refresh_hours::<B>))
        .route("/api/schedule", get(get_schedule_data::<B>))
        .with_state(state)
}

/// Serve the dashboard on `bind` until the process is stopped
pub async fn run<B: SheetsBackend>(
    dashboard: Dashboard<B>,
    bind: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(Arc::new(AppState::new(dashboard)));

    let listener = TcpListener::bind(bind).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_home() -> Html<&'static str> {
    Html(include_str!("./static/home.html"))
}

/// Inject the view model into the Schedule page template
pub fn render_schedule_page(view: &ScheduleView) -> String {
    let json = serde_json::to_string(view)
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/");
    include_str!("./static/schedule.html").replace(
        "</head>",
        &format!("    <script>const SCHEDULE_DATA = {};</script>\n</head>", json),
    )
}

async fn serve_schedule<B: SheetsBackend>(
    State(state): State<Arc<AppState<B>>>,
    jar: CookieJar,
    Query(params): Query<ScheduleQuery>,
) -> impl IntoResponse {
    let (jar, ui) = state.with_session(jar, |ui| params.apply(ui));
    let view = state.dashboard.schedule_view(&ui).await;
    let (jar, _) = state.with_session(jar, |ui| ui.active_tab = view.active_tab.clone());
    (jar, Html(render_schedule_page(&view)))
}

async fn get_schedule_data<B: SheetsBackend>(
    State(state): State<Arc<AppState<B>>>,
    jar: CookieJar,
    Query(params): Query<ScheduleQuery>,
) -> impl IntoResponse {
    let (jar, ui) = state.with_session(jar, |ui| params.apply(ui));
    let view = state.dashboard.schedule_view(&ui).await;
    (jar, Json(view))
}

async fn refresh_hours<B: SheetsBackend>(
    State(state): State<Arc<AppState<B>>>,
    jar: CookieJar,
) -> impl IntoResponse {
    let (jar, ui) = state.with_session(jar, |ui| {
        ui.bump_hours_epoch();
    });
    debug!("hours epoch bumped to {}", ui.hours_epoch);
    (jar, Redirect::to("/schedule"))
}
