mod commands;
mod events;
mod hotkeys;
mod logging;
mod panels;
mod screen;
mod tray;

use events::OverlayBroadcaster;
use mira_core::backend::BackendClient;
use mira_core::config::AppConfig;
use mira_core::dashboard::{DashboardProvider, PollingHandle, POLL_INTERVAL};
use mira_core::demo::seed_snapshot;
use mira_core::orchestrator::Orchestrator;
use mira_core::overlay::{OverlayKind, OverlayManager};
use mira_core::relay::{EventRelay, DASHBOARD_UPDATED};
use mira_core::storage::{default_db_path, SessionStore};
use panels::TauriHost;
use screen::XcapCapturer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tauri::{AppHandle, Emitter, Manager, RunEvent, Window, WindowEvent};
use tracing::{debug, info, warn};
use tray::DASHBOARD_LABEL;

pub struct AppState {
    pub orchestrator: Arc<Orchestrator<TauriHost>>,
    pub dashboard: DashboardProvider<BackendClient>,
    store: Option<Arc<SessionStore>>,
    poller: Mutex<Option<PollingHandle>>,
    exiting: AtomicBool,
}

fn init_logging(app: &AppHandle) {
    match app.path().app_log_dir() {
        Ok(dir) => {
            if let Err(e) = logging::init(&dir) {
                logging::init_stderr();
                warn!(error = %e, "file logging unavailable");
            }
        }
        Err(e) => {
            logging::init_stderr();
            warn!(error = %e, "no app log dir");
        }
    }
}

fn open_store() -> Option<Arc<SessionStore>> {
    let path = default_db_path(dirs::data_local_dir());
    match SessionStore::open(&path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "session store unavailable, dashboard will not persist");
            None
        }
    }
}

fn start_polling(app: &AppHandle) {
    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        let Some(state) = app.try_state::<AppState>() else {
            return;
        };
        let handle = state.dashboard.spawn_polling(POLL_INTERVAL);
        *state.poller.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    });
}

fn setup(app: &AppHandle) -> anyhow::Result<()> {
    init_logging(app);

    let config = AppConfig::from_env();
    info!(
        api = %config.api_base,
        speech = %config.speech.program.display(),
        demo = config.demo_mocks,
        "starting mira"
    );

    let backend = BackendClient::new(config.api_base.clone(), config.api_token.clone());
    let relay = EventRelay::new(Some(Arc::new(OverlayBroadcaster::new(app.clone()))));
    let orchestrator = Orchestrator::new(
        TauriHost::new(app.clone()),
        relay.clone(),
        config.speech.clone(),
        config.stop_grace,
        Arc::new(XcapCapturer::new(app.clone())),
        backend.clone(),
    );

    let store = open_store();
    let seed = seed_snapshot(
        config.demo_mocks,
        chrono::Local::now().naive_local(),
        config.demo_hours_from_8,
    );
    let dashboard = DashboardProvider::new(backend, store.clone(), seed);
    let emitter = app.clone();
    dashboard.set_observer(move |snapshot| {
        if let Err(e) = emitter.emit_to(DASHBOARD_LABEL, DASHBOARD_UPDATED, snapshot) {
            warn!(error = %e, "failed to emit dashboard update");
        }
    });

    app.manage(AppState {
        orchestrator: Arc::new(orchestrator),
        dashboard,
        store,
        poller: Mutex::new(None),
        exiting: AtomicBool::new(false),
    });

    let tray_sync = tray::build(app, &relay)?;
    app.manage(tray_sync);
    hotkeys::register(app, &config);
    start_polling(app);
    Ok(())
}

// toolkit callbacks arrive on the main thread; overlay state is touched from the runtime
fn with_overlays<F>(app: &AppHandle, f: F)
where
    F: FnOnce(&OverlayManager<TauriHost>) + Send + 'static,
{
    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        if let Some(state) = app.try_state::<AppState>() {
            f(state.orchestrator.overlays());
        }
    });
}

fn on_window_event(window: &Window, event: &WindowEvent) {
    let label = window.label();

    // the dashboard lives in the tray; closing it only hides it
    if label == DASHBOARD_LABEL {
        if let WindowEvent::CloseRequested { api, .. } = event {
            api.prevent_close();
            if let Err(e) = window.hide() {
                warn!(error = %e, "failed to hide dashboard");
            }
        }
        return;
    }

    let Some(kind) = OverlayKind::from_label(label) else {
        return;
    };
    let app = window.app_handle();
    match event {
        WindowEvent::Focused(false) => with_overlays(app, move |overlays| {
            if let Err(e) = overlays.focus_lost(kind) {
                warn!(overlay = kind.label(), error = %e, "hide on blur failed");
            }
        }),
        WindowEvent::CloseRequested { api, .. } if kind == OverlayKind::MicStatus => {
            api.prevent_close();
            with_overlays(app, move |overlays| {
                if let Err(e) = overlays.hide(kind) {
                    warn!(error = %e, "failed to hide mic overlay");
                }
            });
        }
        WindowEvent::Destroyed => {
            debug!(overlay = kind.label(), "window destroyed");
            with_overlays(app, move |overlays| overlays.window_destroyed(kind));
        }
        _ => {}
    }
}

/// First exit request: tear down on the async runtime with the main thread
/// free (tray updates need it), then exit for real. Returns whether the
/// request was deferred.
fn begin_shutdown(app: &AppHandle) -> bool {
    let Some(state) = app.try_state::<AppState>() else {
        return false;
    };
    if state.exiting.swap(true, Ordering::SeqCst) {
        return false;
    }
    hotkeys::unregister_all(app);

    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        shutdown(&app).await;
        app.exit(0);
    });
    true
}

async fn shutdown(app: &AppHandle) {
    let Some(state) = app.try_state::<AppState>() else {
        return;
    };

    if let Some(poller) = state.poller.lock().unwrap_or_else(PoisonError::into_inner).take() {
        poller.stop();
    }
    state.dashboard.cancel_refresh();
    state.orchestrator.shutdown().await;

    // the snapshot only lives for one session
    if let Some(store) = &state.store {
        if let Err(e) = store.clear() {
            warn!(error = %e, "failed to clear session store");
        }
    }
}

pub fn run() {
    // load .env
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_filename("../.env");
    }

    let mut builder =
        tauri::Builder::default().plugin(tauri_plugin_global_shortcut::Builder::new().build());

    #[cfg(target_os = "macos")]
    {
        builder = builder.plugin(tauri_nspanel::init());
    }

    builder
        .setup(|app| {
            // menubar app, no dock icon
            #[cfg(target_os = "macos")]
            app.set_activation_policy(tauri::ActivationPolicy::Accessory);

            setup(app.handle())?;
            Ok(())
        })
        .on_window_event(on_window_event)
        .invoke_handler(tauri::generate_handler![
            commands::capture_screen,
            commands::start_mic,
            commands::stop_mic,
            commands::get_mic_view,
            commands::assist_with_screenshot,
            commands::ask_by_voice,
            commands::toggle_ask_overlay,
            commands::hide_ask_overlay,
            commands::close_ask_overlay,
            commands::get_dashboard,
            commands::refresh_dashboard,
            commands::debug_log,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| match event {
            RunEvent::ExitRequested { api, .. } => {
                if begin_shutdown(app) {
                    api.prevent_exit();
                }
            }
            RunEvent::Exit => info!("mira stopped"),
            _ => {}
        });
}
