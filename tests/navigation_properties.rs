//! Navigation reconciler behaviour over an in-memory host page stack

mod common;

use common::{navigator_over, navigator_with, numbered_pages, urls};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use waypost::navigate::RestoreContext;
use waypost::navigate::RestoreOutcome;
use waypost::testing::{MockPlatform, PlatformCall, RecordingRestorer};
use waypost::{NavigationError, NavigatorConfig, PhysicalStack, PlatformError};

const CURTAIN: &str = "/pages/curtain/curtain";

fn replace(url: &str) -> PlatformCall {
    PlatformCall::Replace(url.to_string())
}

fn open(url: &str) -> PlatformCall {
    PlatformCall::Open(url.to_string())
}

#[tokio::test(start_paused = true)]
async fn history_should_follow_host_after_outside_changes() {
    let platform = MockPlatform::with_pages(numbered_pages(3));
    let navigator = navigator_over(&platform);
    assert_eq!(urls(&navigator), numbered_pages(3));

    // the host changes behind the reconciler's back
    platform.replace_page("/pages/other").await.unwrap();
    assert_eq!(urls(&navigator), vec!["/pages/p0", "/pages/p1", "/pages/other"]);

    platform.go_back(1).await.unwrap();
    navigator.navigate_to("/pages/next").await.unwrap();

    assert_eq!(urls(&navigator), vec!["/pages/p0", "/pages/p1", "/pages/next"]);
    assert_eq!(urls(&navigator), platform.pages());
}

#[tokio::test(start_paused = true)]
async fn earlier_pages_sharing_a_path_should_be_tainted() {
    let platform = MockPlatform::with_pages(["/home"]);
    let navigator = navigator_over(&platform);

    for url in ["/detail?id=1", "/list", "/detail?id=2"] {
        navigator.navigate_to(url).await.unwrap();
    }

    let taints: Vec<bool> = navigator.history().iter().map(|entry| entry.tainted).collect();
    assert_eq!(taints, vec![false, true, false, false]);
}

#[tokio::test(start_paused = true)]
async fn opening_from_second_to_last_slot_should_put_up_curtain() {
    let platform = MockPlatform::with_pages(numbered_pages(9));
    let navigator = navigator_over(&platform);

    navigator.navigate_to("/pages/x").await.unwrap();

    assert_eq!(platform.calls(), vec![replace(CURTAIN), open("/pages/x")]);
    assert!(platform.current_depth() <= 10);
    assert_eq!(navigator.history().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn failed_open_behind_curtain_should_bring_evicted_page_back() {
    let platform = MockPlatform::with_pages(numbered_pages(9));
    let restorer = RecordingRestorer::answering(RestoreOutcome::succeeded());
    let navigator = navigator_over(&platform).with_restorer(Arc::new(restorer.clone()));
    platform.fail_next_open(PlatformError::Other("page not found".to_string()));

    let result = navigator.navigate_to("/missing").await;

    assert_eq!(
        result,
        Err(NavigationError::Platform(PlatformError::Other(
            "page not found".to_string()
        )))
    );
    assert_eq!(
        platform.calls(),
        vec![
            replace(CURTAIN),
            open("/missing"),
            replace("/pages/p8?_forcedRefresh=true"),
        ]
    );
    assert_eq!(platform.current_depth(), 9);
    assert_eq!(urls(&navigator), numbered_pages(9));
    assert_eq!(
        restorer.requests(),
        vec![("/pages/p8".to_string(), RestoreContext::Unloaded)]
    );
    assert_eq!(
        restorer.routes()[0].saved_page,
        Some(json!({"url": "/pages/p8"}))
    );
}

#[tokio::test(start_paused = true)]
async fn failed_replace_at_cap_should_leave_history_alone() {
    let platform = MockPlatform::with_pages(numbered_pages(10));
    let navigator = navigator_over(&platform);
    platform.fail_next_replace(PlatformError::Other("busy".to_string()));

    let result = navigator.navigate_to("/deep").await;

    assert!(matches!(result, Err(NavigationError::Platform(_))));
    assert_eq!(navigator.history().len(), 10);
    assert_eq!(urls(&navigator), numbered_pages(10));
    assert_eq!(platform.pages(), numbered_pages(10));
    assert!(!navigator.is_active_unload());

    // the next attempt goes through normally
    navigator.navigate_to("/deep").await.unwrap();
    assert_eq!(navigator.history().len(), 11);
    assert_eq!(platform.pages()[9], "/deep");
}

#[tokio::test(start_paused = true)]
async fn failed_redirect_should_keep_previous_top_entry() {
    let platform = MockPlatform::with_pages(numbered_pages(10));
    let navigator = navigator_over(&platform);
    platform.fail_next_replace(PlatformError::Other("busy".to_string()));

    let result = navigator.redirect_to("/pages/elsewhere").await;

    assert!(result.is_err());
    assert_eq!(urls(&navigator), numbered_pages(10));
    assert_eq!(platform.pages(), numbered_pages(10));
    assert!(!navigator.is_active_unload());
}

#[tokio::test(start_paused = true)]
async fn concurrent_navigations_should_run_one_at_a_time_in_call_order() {
    let platform = MockPlatform::with_pages(["/home"]).with_latency(Duration::from_millis(50));
    let navigator = navigator_over(&platform);

    let (a, b, c) = tokio::join!(
        navigator.navigate_to("/a"),
        navigator.navigate_to("/b"),
        navigator.navigate_to("/c"),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(platform.calls(), vec![open("/a"), open("/b"), open("/c")]);
    assert_eq!(platform.overlap().peak(), 1);
    assert_eq!(urls(&navigator), vec!["/home", "/a", "/b", "/c"]);
}

#[tokio::test(start_paused = true)]
async fn persistent_false_limit_alarm_should_give_up_after_backoff() {
    let platform = MockPlatform::with_pages(numbered_pages(3)).with_capacity(3);
    let navigator = navigator_over(&platform);
    let started = Instant::now();

    let result = navigator.navigate_to("/pages/x").await;

    assert_eq!(
        result,
        Err(NavigationError::LimitRetryExhausted {
            url: "/pages/x".to_string(),
            waited_ms: 2100,
        })
    );
    assert_eq!(started.elapsed(), Duration::from_millis(2100));
    assert_eq!(platform.calls(), vec![open("/pages/x"); 4]);
    assert_eq!(urls(&navigator), numbered_pages(3));
}

#[tokio::test(start_paused = true)]
async fn open_retry_timeout_should_bound_backoff() {
    let platform = MockPlatform::with_pages(numbered_pages(3)).with_capacity(3);
    let config = NavigatorConfig {
        open_retry_timeout: Duration::from_millis(500),
        ..NavigatorConfig::default()
    };
    let navigator = navigator_with(&platform, config);

    let result = navigator.navigate_to("/pages/x").await;

    assert!(matches!(
        result,
        Err(NavigationError::LimitRetryExhausted { waited_ms: 300, .. })
    ));
    assert_eq!(platform.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn deep_round_trip_should_end_on_home_page() {
    let platform = MockPlatform::with_pages(["/home"]);
    let navigator = navigator_over(&platform);

    for i in 1..=12 {
        navigator.navigate_to(&format!("/p{i}")).await.unwrap();
    }
    assert_eq!(navigator.history().len(), 13);
    assert_eq!(platform.current_depth(), 10);
    platform.clear_calls();

    for _ in 0..12 {
        navigator.navigate_back(1).await.unwrap();
    }

    let calls = platform.calls();
    assert_eq!(
        calls[..5],
        [
            replace("/p11?_forcedRefresh=true"),
            replace("/p10?_forcedRefresh=true"),
            replace("/p9?_forcedRefresh=true"),
            PlatformCall::Back(1),
            replace("/p8?_forcedRefresh=true"),
        ]
    );
    assert!(calls[5..].iter().all(|call| *call == PlatformCall::Back(1)));
    assert_eq!(platform.pages(), vec!["/home"]);
    assert_eq!(urls(&navigator), vec!["/home"]);
}

#[tokio::test(start_paused = true)]
async fn saved_page_should_reach_restorer_when_evicted_page_returns() {
    let platform = MockPlatform::with_pages(numbered_pages(10));
    let restorer = RecordingRestorer::answering(RestoreOutcome::succeeded());
    let navigator = navigator_over(&platform).with_restorer(Arc::new(restorer.clone()));

    navigator.navigate_to("/pages/x").await.unwrap();
    navigator.navigate_back(1).await.unwrap();

    assert_eq!(
        platform.calls(),
        vec![replace("/pages/x"), replace("/pages/p9?_forcedRefresh=true")]
    );
    assert_eq!(
        restorer.requests(),
        vec![("/pages/p9".to_string(), RestoreContext::Unloaded)]
    );
    assert_eq!(
        restorer.routes()[0].saved_page,
        Some(json!({"url": "/pages/p9"}))
    );
}

#[tokio::test(start_paused = true)]
async fn back_gesture_onto_tainted_page_should_ask_restorer() {
    let platform = MockPlatform::with_pages(["/home", "/detail?id=1", "/list", "/detail?id=2"]);
    let restorer = RecordingRestorer::answering(RestoreOutcome::succeeded());
    let navigator = navigator_over(&platform).with_restorer(Arc::new(restorer.clone()));

    platform.back_gesture(&navigator).await.unwrap();
    assert!(restorer.requests().is_empty());

    platform.back_gesture(&navigator).await.unwrap();

    assert_eq!(
        restorer.requests(),
        vec![("/detail?id=1".to_string(), RestoreContext::Tainted)]
    );
    assert!(platform.calls().is_empty());
    assert!(!navigator.history()[1].tainted);
    assert_eq!(platform.pages(), vec!["/home", "/detail?id=1"]);
}

#[tokio::test(start_paused = true)]
async fn unloads_after_relaunch_should_not_count_as_gestures() {
    let platform = MockPlatform::with_pages(numbered_pages(4));
    let navigator = navigator_over(&platform);

    navigator.relaunch("/home").await.unwrap();
    assert!(navigator.is_active_unload());

    let (first, second, third) = tokio::join!(
        navigator.on_page_unload(),
        navigator.on_page_unload(),
        navigator.on_page_unload(),
    );

    assert!(first.is_ok() && second.is_ok() && third.is_ok());
    assert!(!navigator.is_active_unload());
    assert_eq!(platform.calls(), vec![PlatformCall::Relaunch("/home".to_string())]);
    assert_eq!(urls(&navigator), vec!["/home"]);
}

#[tokio::test(start_paused = true)]
async fn back_on_empty_host_should_report_empty_history() {
    let platform = MockPlatform::with_pages(Vec::<String>::new());
    let navigator = navigator_over(&platform);

    let result = navigator.navigate_back(1).await;

    assert_eq!(result, Err(NavigationError::EmptyHistory));
}
