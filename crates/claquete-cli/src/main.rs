use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use uuid::Uuid;

use claquete_db::Database;
use claquete_realtime::Hub;
use claquete_sync::{
    AuthContext, LocalBackend, Projector, SessionController, SubscriptionManager, SyncConfig,
    TracingSink,
};
use claquete_types::models::{ConversationView, Profile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claquete=debug".into()),
        )
        .init();

    let config = SyncConfig::from_env()?;
    let demo = std::env::args().skip(1).any(|arg| arg == "--demo");

    let db = if demo {
        Database::open_in_memory()?
    } else {
        Database::open(&config.db_path)?
    };
    let hub = Hub::new(config.feed_capacity);
    let backend = Arc::new(LocalBackend::new(db, hub.clone()));

    let user_id = if demo {
        seed_demo(&backend)?
    } else {
        std::env::var("CLAQUETE_USER_ID")
            .context("CLAQUETE_USER_ID is required (or run with --demo)")?
            .parse::<Uuid>()
            .context("CLAQUETE_USER_ID must be a UUID")?
    };

    // Session wiring
    let manager = SubscriptionManager::new(Arc::new(hub.clone()), Arc::new(TracingSink));
    let controller = SessionController::new(manager);
    let auth = AuthContext::new();
    let follower = tokio::spawn({
        let controller = controller.clone();
        let rx = auth.watch();
        async move { controller.follow(rx).await }
    });

    auth.begin_loading()?;
    auth.sign_in(user_id)?;
    // Apply right away instead of waiting for the follower to observe it.
    controller.apply(&auth.current());

    let scope = controller
        .current()
        .context("session did not start after sign-in")?;
    let conversations = scope.conversations(backend.clone(), Projector::new(config.utc_offset));

    if demo {
        run_demo_traffic(&backend, user_id)?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if let Err(e) = conversations.refresh().await {
        tracing::warn!("Initial refresh failed: {}", e);
    }
    let state = conversations.snapshot();
    info!("{} conversation(s), {} unread notification(s)", state.conversations.len(), scope.counter.get());
    for view in &state.conversations {
        print_conversation(view);
    }

    if !demo {
        info!("Listening for notifications, Ctrl+C to quit");
        tokio::signal::ctrl_c().await?;
    }

    auth.sign_out()?;
    drop(auth);
    follower.await?;
    hub.shutdown();

    Ok(())
}

fn print_conversation(view: &ConversationView) {
    println!(
        "[{}] {} · {} ({}) · {} {} · {} não lida(s)",
        view.status,
        view.title,
        view.counterpart_name,
        view.service_type,
        view.last_message_time,
        view.last_message,
        view.unread_count
    );
}

const DEMO_CLIENT: Uuid = Uuid::from_u128(0xC11E_0001);
const DEMO_FREELANCER: Uuid = Uuid::from_u128(0xF2EE_0001);

/// Seeds two profiles; the demo runs as the freelancer.
fn seed_demo(backend: &LocalBackend) -> anyhow::Result<Uuid> {
    backend.upsert_profile(&Profile {
        id: DEMO_CLIENT,
        full_name: "Carla Produtora".into(),
        avatar_url: None,
    })?;
    backend.upsert_profile(&Profile {
        id: DEMO_FREELANCER,
        full_name: "Ana Cinegrafista".into(),
        avatar_url: Some("avatars/ana.png".into()),
    })?;
    Ok(DEMO_FREELANCER)
}

/// The client sends an offer and a first message to the signed-in freelancer.
fn run_demo_traffic(backend: &LocalBackend, freelancer: Uuid) -> anyhow::Result<()> {
    let offer = backend.create_offer(DEMO_CLIENT, freelancer, "Videoclipe da banda", "Operador de câmera")?;
    backend.send_message(offer.id, DEMO_CLIENT, "Oi Ana! Topa gravar no sábado?")?;
    Ok(())
}
