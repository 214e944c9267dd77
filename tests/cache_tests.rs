/// Asset cache integration tests: load ordering, sharing and eviction when
/// loads complete out of order.
use futures::future::{BoxFuture, FutureExt};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use vn_playback::core::cache::{AssetCache, AssetLoader, CacheError, ResolveOutcome};
use vn_playback::schema::node::{Directive, Slot};

/// Every load waits until the test completes or fails it by name.
#[derive(Default)]
struct GatedLoader {
    pending: Mutex<Vec<(String, oneshot::Sender<Result<String, String>>)>>,
    loads: Mutex<Vec<String>>,
    released: Mutex<Vec<String>>,
}

impl GatedLoader {
    fn finish(&self, name: &str, result: Result<String, String>) {
        let mut pending = self.pending.lock().unwrap();
        let index = pending
            .iter()
            .position(|(n, _)| n == name)
            .expect("no pending load for name");
        let (_, tx) = pending.remove(index);
        tx.send(result).unwrap();
    }

    fn complete(&self, name: &str) {
        self.finish(name, Ok(format!("img:{}", name)));
    }

    fn fail(&self, name: &str, reason: &str) {
        self.finish(name, Err(reason.to_string()));
    }

    fn load_count(&self) -> usize {
        self.loads.lock().unwrap().len()
    }

    fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

impl AssetLoader for GatedLoader {
    type Resource = String;

    fn load(&self, name: &str) -> BoxFuture<'static, Result<String, String>> {
        let (tx, rx) = oneshot::channel();
        self.loads.lock().unwrap().push(name.to_string());
        self.pending.lock().unwrap().push((name.to_string(), tx));
        async move { rx.await.unwrap_or_else(|_| Err("load abandoned".to_string())) }.boxed()
    }

    fn release(&self, name: &str, _resource: &String) {
        self.released.lock().unwrap().push(name.to_string());
    }
}

fn cache() -> Arc<AssetCache<GatedLoader>> {
    Arc::new(AssetCache::new(GatedLoader::default()))
}

fn applied_name(outcome: &ResolveOutcome<String>) -> Option<&str> {
    match outcome {
        ResolveOutcome::Applied(resource) => Some(resource.as_str()),
        _ => None,
    }
}

#[tokio::test]
async fn newer_request_wins_when_it_finishes_first() {
    let cache = cache();
    let first = cache.resolve(Slot::Background, Directive::show("a"));
    let second = cache.resolve(Slot::Background, Directive::show("b"));

    cache.loader().complete("b");
    let second = second.await.unwrap();
    assert_eq!(applied_name(&second), Some("img:b"));
    assert_eq!(cache.displayed(Slot::Background).as_deref(), Some("b"));

    cache.loader().complete("a");
    let first = first.await.unwrap();
    assert!(matches!(first, ResolveOutcome::Superseded));

    assert_eq!(cache.displayed(Slot::Background).as_deref(), Some("b"));
    assert_eq!(cache.ref_count("b"), 1);
    assert_eq!(cache.ref_count("a"), 0);
    assert!(cache.get("a").is_none());
    assert_eq!(cache.loader().released(), vec!["a".to_string()]);
}

#[tokio::test]
async fn newer_request_wins_when_it_finishes_last() {
    let cache = cache();
    let first = cache.resolve(Slot::Background, Directive::show("a"));
    let second = cache.resolve(Slot::Background, Directive::show("b"));

    cache.loader().complete("a");
    let first = first.await.unwrap();
    assert!(matches!(first, ResolveOutcome::Superseded));
    // the stale result is never visible, not even before the newer one lands
    assert_eq!(cache.displayed(Slot::Background), None);
    assert_eq!(cache.loader().released(), vec!["a".to_string()]);

    cache.loader().complete("b");
    let second = second.await.unwrap();
    assert!(second.is_applied());
    assert_eq!(cache.displayed(Slot::Background).as_deref(), Some("b"));
    assert_eq!(cache.ref_count("b"), 1);
}

#[tokio::test]
async fn repeated_request_while_loading_is_idempotent() {
    let cache = cache();
    let first = cache.resolve(Slot::CharLeft, Directive::show("mei"));
    let again = cache.resolve(Slot::CharLeft, Directive::show("mei"));
    assert!(matches!(again.await.unwrap(), ResolveOutcome::Unchanged));
    assert_eq!(cache.pending(Slot::CharLeft).as_deref(), Some("mei"));

    cache.loader().complete("mei");
    assert!(first.await.unwrap().is_applied());
    assert_eq!(cache.loader().load_count(), 1);
    assert_eq!(cache.ref_count("mei"), 1);
}

#[tokio::test]
async fn concurrent_slots_share_one_load() {
    let cache = cache();
    let left = tokio::spawn(cache.resolve(Slot::CharLeft, Directive::show("twin")));
    let right = tokio::spawn(cache.resolve(Slot::CharRight, Directive::show("twin")));
    assert!(cache.is_loading("twin"));
    assert_eq!(cache.loader().load_count(), 1);

    cache.loader().complete("twin");
    assert!(left.await.unwrap().unwrap().is_applied());
    assert!(right.await.unwrap().unwrap().is_applied());

    assert_eq!(cache.ref_count("twin"), 2);
    assert!(!cache.is_loading("twin"));
    cache.resolve(Slot::CharLeft, Directive::Clear).await.unwrap();
    assert_eq!(cache.ref_count("twin"), 1);
    assert!(cache.get("twin").is_some());
    cache.resolve(Slot::CharRight, Directive::Clear).await.unwrap();
    assert!(cache.get("twin").is_none());
    assert_eq!(cache.loader().released(), vec!["twin".to_string()]);
}

#[tokio::test]
async fn returning_to_an_in_flight_name_joins_its_load() {
    let cache = cache();
    let first_a = cache.resolve(Slot::Background, Directive::show("a"));
    let b = cache.resolve(Slot::Background, Directive::show("b"));
    let second_a = cache.resolve(Slot::Background, Directive::show("a"));
    assert_eq!(cache.loader().load_count(), 2);

    cache.loader().complete("a");
    assert!(matches!(first_a.await.unwrap(), ResolveOutcome::Superseded));
    assert!(second_a.await.unwrap().is_applied());

    cache.loader().complete("b");
    assert!(matches!(b.await.unwrap(), ResolveOutcome::Superseded));
    assert_eq!(cache.displayed(Slot::Background).as_deref(), Some("a"));
    assert_eq!(cache.ref_count("a"), 1);
    assert_eq!(cache.loader().released(), vec!["b".to_string()]);
}

#[tokio::test]
async fn clear_cancels_pending_load() {
    let cache = cache();
    let load = cache.resolve(Slot::Cg, Directive::show("cg_rain"));
    let cleared = cache.resolve(Slot::Cg, Directive::Clear).await.unwrap();
    assert!(matches!(cleared, ResolveOutcome::Cleared));

    cache.loader().complete("cg_rain");
    assert!(matches!(load.await.unwrap(), ResolveOutcome::Superseded));
    assert_eq!(cache.displayed(Slot::Cg), None);
    assert!(cache.is_empty());
    assert_eq!(cache.loader().released(), vec!["cg_rain".to_string()]);
}

#[tokio::test]
async fn failed_load_keeps_previous_asset() {
    let cache = cache();
    let first = cache.resolve(Slot::Background, Directive::show("bg_day"));
    cache.loader().complete("bg_day");
    first.await.unwrap();

    let broken = cache.resolve(Slot::Background, Directive::show("bg_night"));
    cache.loader().fail("bg_night", "corrupt file");
    let err = broken.await.unwrap_err();
    assert_eq!(
        err,
        CacheError::Load {
            name: "bg_night".to_string(),
            reason: "corrupt file".to_string(),
        }
    );
    assert_eq!(cache.displayed(Slot::Background).as_deref(), Some("bg_day"));
    assert_eq!(cache.pending(Slot::Background), None);
    assert_eq!(cache.ref_count("bg_day"), 1);
    assert!(cache.loader().released().is_empty());
}

#[tokio::test]
async fn evicted_asset_is_reloaded_fresh() {
    let cache = cache();
    let show = cache.resolve(Slot::CharCenter, Directive::show("guard"));
    cache.loader().complete("guard");
    show.await.unwrap();
    cache.resolve(Slot::CharCenter, Directive::Clear).await.unwrap();
    assert!(cache.get("guard").is_none());

    let again = cache.resolve(Slot::CharCenter, Directive::show("guard"));
    assert!(cache.is_loading("guard"));
    cache.loader().complete("guard");
    assert!(again.await.unwrap().is_applied());
    assert_eq!(cache.loader().load_count(), 2);
    assert_eq!(cache.ref_count("guard"), 1);
}

#[tokio::test]
async fn dropped_request_still_updates_its_slot() {
    let cache = cache();
    drop(cache.resolve(Slot::Background, Directive::show("a")));
    let other = cache.resolve(Slot::CharLeft, Directive::show("a"));

    cache.loader().complete("a");
    assert!(other.await.unwrap().is_applied());
    assert_eq!(cache.displayed(Slot::Background).as_deref(), Some("a"));
    assert_eq!(cache.ref_count("a"), 2);
}
