//! Orchestrator tests: load de-duplication, load-before-show, pending actions

use super::*;
use crate::bus::drain;
use crate::cache::{Anchor, AnnotationForCache, MutationOpts, PageAnnotationsCache};
use crate::gateway::{MemoryAnchoring, MemoryLoader};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    ui: SharedInPageUiState,
    loader: Arc<MemoryLoader>,
    anchoring: Arc<MemoryAnchoring>,
    cache: Arc<PageAnnotationsCache>,
}

fn fixture_with(loader: MemoryLoader, ttl: Duration) -> Fixture {
    let loader = Arc::new(loader);
    let anchoring = Arc::new(MemoryAnchoring::new());
    let cache = Arc::new(PageAnnotationsCache::new());
    let ui = SharedInPageUiState::with_options(
        InPageUiDeps {
            cache: cache.clone(),
            anchoring: anchoring.clone(),
            registry: ComponentRegistry::with_script_loader(loader.clone()),
        },
        Arc::new(crate::bus::EventBus::default()),
        ttl,
    );
    Fixture {
        ui,
        loader,
        anchoring,
        cache,
    }
}

fn fixture() -> Fixture {
    fixture_with(
        MemoryLoader::new().with_delay(Duration::from_millis(10)),
        DEFAULT_PENDING_ACTION_TTL,
    )
}

async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

fn position(events: &[InPageUiEvent], wanted: impl Fn(&InPageUiEvent) -> bool) -> Option<usize> {
    events.iter().position(wanted)
}

#[tokio::test]
async fn concurrent_loads_run_the_loader_once() {
    let f = fixture();
    let (a, b) = tokio::join!(
        f.ui.load_component(Component::Sidebar),
        f.ui.load_component(Component::Sidebar)
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(f.loader.calls(Component::Sidebar), 1);
    assert_eq!(f.ui.load_status(Component::Sidebar), LoadStatus::Ready);

    f.ui.load_component(Component::Sidebar).await.unwrap();
    assert_eq!(f.loader.calls(Component::Sidebar), 1);
}

#[tokio::test]
async fn showing_an_unloaded_sidebar_loads_it_first() {
    let f = fixture();
    let mut rx = f.ui.subscribe();
    assert_eq!(f.ui.load_status(Component::Sidebar), LoadStatus::Unloaded);

    f.ui.show_sidebar(None).await.unwrap();

    assert_eq!(f.loader.calls(Component::Sidebar), 1);
    assert!(f.ui.is_shown(Component::Sidebar));
    let events = drain(&mut rx);
    let set_up = position(&events, |e| {
        matches!(e, InPageUiEvent::ComponentShouldSetUp { component: Component::Sidebar })
    })
    .expect("sidebar set-up signal");
    let shown = position(&events, |e| {
        matches!(
            e,
            InPageUiEvent::StateChanged { component: Component::Sidebar, shown: true, .. }
        )
    })
    .expect("sidebar shown signal");
    assert!(set_up < shown);
}

#[tokio::test]
async fn show_sidebar_also_shows_ribbon() {
    let f = fixture();
    f.ui.show_sidebar(None).await.unwrap();
    assert!(f.ui.is_shown(Component::Ribbon));
    assert_eq!(f.loader.calls(Component::Ribbon), 1);
}

#[tokio::test]
async fn show_ribbon_preloads_sidebar_without_showing_it() {
    let f = fixture();
    f.ui.show_ribbon(None).await.unwrap();
    assert!(f.ui.is_shown(Component::Ribbon));

    let ui = f.ui.clone();
    assert!(eventually(move || ui.load_status(Component::Sidebar) == LoadStatus::Ready).await);
    assert!(!f.ui.is_shown(Component::Sidebar));
    assert_eq!(f.loader.calls(Component::Sidebar), 1);
}

#[tokio::test]
async fn failed_load_rejects_and_leaves_component_hidden() {
    let f = fixture();
    f.loader.fail(Component::Tooltip, "script blocked");

    let err = f.ui.show_tooltip().await.unwrap_err();
    assert_eq!(err.component, Component::Tooltip);
    assert!(!f.ui.is_shown(Component::Tooltip));
    assert_eq!(f.ui.load_status(Component::Tooltip), LoadStatus::Unloaded);

    f.loader.recover(Component::Tooltip);
    f.ui.show_tooltip().await.unwrap();
    assert!(f.ui.is_shown(Component::Tooltip));
    assert_eq!(f.loader.calls(Component::Tooltip), 2);
}

#[tokio::test]
async fn concurrent_waiters_share_a_load_failure() {
    let f = fixture();
    f.loader.fail(Component::Sidebar, "boom");
    let (a, b) = tokio::join!(
        f.ui.load_component(Component::Sidebar),
        f.ui.load_component(Component::Sidebar)
    );
    assert_eq!(a.unwrap_err(), b.unwrap_err());
    assert_eq!(f.loader.calls(Component::Sidebar), 1);
}

#[tokio::test]
async fn unloading_makes_the_next_load_run_again() {
    let f = fixture();
    f.ui.load_component(Component::Ribbon).await.unwrap();
    f.ui.unload_component(Component::Ribbon);
    assert_eq!(f.ui.load_status(Component::Ribbon), LoadStatus::Unloaded);
    assert!(!f.ui.is_set_up(Component::Ribbon));

    f.ui.load_component(Component::Ribbon).await.unwrap();
    assert_eq!(f.loader.calls(Component::Ribbon), 2);
}

#[tokio::test]
async fn unloading_during_a_load_cancels_the_pending_show() {
    let f = fixture_with(
        MemoryLoader::new().with_delay(Duration::from_millis(50)),
        DEFAULT_PENDING_ACTION_TTL,
    );
    let mut rx = f.ui.subscribe();

    let showing = tokio::spawn({
        let ui = f.ui.clone();
        async move { ui.show_tooltip().await }
    });
    assert!(eventually(|| f.ui.load_status(Component::Tooltip) == LoadStatus::Loading).await);
    f.ui.unload_component(Component::Tooltip);

    let err = showing.await.unwrap().unwrap_err();
    assert_eq!(err.component, Component::Tooltip);
    assert!(!f.ui.is_shown(Component::Tooltip));
    assert!(!f.ui.is_set_up(Component::Tooltip));
    assert_eq!(f.ui.load_status(Component::Tooltip), LoadStatus::Unloaded);

    let events = drain(&mut rx);
    assert!(position(&events, |e| matches!(
        e,
        InPageUiEvent::StateChanged {
            component: Component::Tooltip,
            shown: true,
            ..
        }
    ))
    .is_none());
    assert!(position(&events, |e| matches!(
        e,
        InPageUiEvent::ComponentShouldSetUp {
            component: Component::Tooltip
        }
    ))
    .is_none());
}

#[tokio::test]
async fn missing_loader_is_a_load_error() {
    let ui = SharedInPageUiState::new(InPageUiDeps {
        cache: Arc::new(PageAnnotationsCache::new()),
        anchoring: Arc::new(MemoryAnchoring::new()),
        registry: ComponentRegistry::new(),
    });
    let err = ui.load_component(Component::Sidebar).await.unwrap_err();
    assert_eq!(err.component, Component::Sidebar);
    assert!(ui.load_component(Component::Highlights).await.is_ok());
}

#[tokio::test]
async fn action_waits_for_sidebar_to_mount() {
    let f = fixture();
    let mut rx = f.ui.subscribe();
    let options = SidebarActionOptions::new(SidebarAction::ShowAnnotations);

    f.ui.show_sidebar(Some(options.clone())).await.unwrap();
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, InPageUiEvent::SidebarAction(_))));

    let delivered = f.ui.ack_set_up(Component::Sidebar);
    assert_eq!(delivered, Some(PendingAction::Sidebar(options.clone())));
    assert!(drain(&mut rx).contains(&InPageUiEvent::SidebarAction(options)));
    assert!(f.ui.ack_set_up(Component::Sidebar).is_none());
}

#[tokio::test]
async fn stale_pending_action_is_dropped() {
    let f = fixture_with(MemoryLoader::new(), Duration::from_millis(10));
    f.ui.show_ribbon(Some(RibbonAction::Bookmark)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(f.ui.ack_set_up(Component::Ribbon).is_none());
}

#[tokio::test]
async fn mounted_component_receives_action_directly() {
    let f = fixture();
    f.ui.show_sidebar(None).await.unwrap();
    f.ui.ack_set_up(Component::Sidebar);
    let mut rx = f.ui.subscribe();

    let options = SidebarActionOptions::new(SidebarAction::Comment);
    f.ui.show_sidebar(Some(options.clone())).await.unwrap();
    assert_eq!(drain(&mut rx), vec![InPageUiEvent::SidebarAction(options)]);
}

#[tokio::test]
async fn removing_ribbon_tears_down_sidebar_and_reuses_load() {
    let f = fixture();
    f.ui.show_sidebar(None).await.unwrap();
    let mut rx = f.ui.subscribe();

    f.ui.remove_ribbon();
    let events = drain(&mut rx);
    for component in [Component::Sidebar, Component::Ribbon] {
        assert!(events.contains(&InPageUiEvent::ComponentShouldDestroy { component }));
        assert!(!f.ui.is_shown(component));
    }

    f.ui.show_sidebar(None).await.unwrap();
    assert!(drain(&mut rx).contains(&InPageUiEvent::ComponentShouldSetUp {
        component: Component::Sidebar
    }));
    assert_eq!(f.loader.calls(Component::Sidebar), 1);
}

#[tokio::test]
async fn toggle_tooltip_shows_then_removes() {
    let f = fixture();
    f.ui.toggle_tooltip().await.unwrap();
    assert!(f.ui.is_shown(Component::Tooltip));
    f.ui.toggle_tooltip().await.unwrap();
    assert!(!f.ui.is_shown(Component::Tooltip));
    assert!(!f.ui.is_set_up(Component::Tooltip));
}

#[tokio::test]
async fn mount_state_is_separate_from_visibility() {
    let f = fixture();
    f.ui.show_tooltip().await.unwrap();
    assert!(f.ui.is_shown(Component::Tooltip));
    assert!(!f.ui.is_mounted(Component::Tooltip));

    f.ui.ack_set_up(Component::Tooltip);
    f.ui.hide_tooltip().await.unwrap();
    assert!(f.ui.is_mounted(Component::Tooltip));

    f.ui.ack_destroyed(Component::Tooltip);
    assert!(!f.ui.is_mounted(Component::Tooltip));
}

#[tokio::test]
async fn highlights_render_anchored_annotations_and_open_sidebar_on_click() {
    let f = fixture();
    assert!(!f.ui.show_highlights().await.unwrap());

    let anchored = f.cache.add_annotation(
        AnnotationForCache::new("p").with_body("a").with_selector(Anchor::new("a")),
        MutationOpts::default(),
    );
    f.cache.add_annotation(AnnotationForCache::new("p").with_comment("note"), MutationOpts::default());

    assert!(f.ui.show_highlights().await.unwrap());
    assert!(f.ui.are_highlights_shown());
    assert_eq!(f.anchoring.highlight_count(), 1);

    assert!(f.anchoring.click(&anchored));
    let ui = f.ui.clone();
    assert!(eventually(move || ui.is_shown(Component::Sidebar)).await);

    assert!(!f.ui.toggle_highlights().await.unwrap());
    assert_eq!(f.anchoring.highlight_count(), 0);
}

#[tokio::test]
async fn error_display_round_trip() {
    let f = fixture();
    let mut rx = f.ui.subscribe();
    f.ui.show_error("could not save");
    assert_eq!(f.ui.error().as_deref(), Some("could not save"));
    f.ui.hide_error();
    f.ui.hide_error();
    assert_eq!(
        drain(&mut rx),
        vec![
            InPageUiEvent::ErrorShown {
                message: Some("could not save".into())
            },
            InPageUiEvent::ErrorShown { message: None },
        ]
    );
}
