use super::*;
use chrono::TimeZone;
use tempfile::TempDir;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, hour, 0, 0)
        .single()
        .expect("valid time")
}

fn cache_in(dir: &TempDir) -> ContextCache {
    ContextCache::new(dir.path().join("web_cache.json"), TimeDelta::hours(24))
}

#[test]
fn keys_are_trimmed_and_lowercased() {
    assert_eq!(normalize_key("  What Does Yo DO?  "), "what does yo do?");
}

#[test]
fn missing_file_is_empty() {
    let dir = TempDir::new().expect("temp dir");
    let cache = cache_in(&dir);

    assert_eq!(cache.get("anything"), None);
    assert!(cache.list().is_empty());
}

#[test]
fn put_then_get_hits_immediately() {
    let dir = TempDir::new().expect("temp dir");
    let cache = cache_in(&dir);

    cache
        .put("What does Yo do?", vec!["Yo is a second brain.".to_string()])
        .expect("put");

    assert_eq!(
        cache.get(" what does yo do? "),
        Some(vec!["Yo is a second brain.".to_string()])
    );
}

#[test]
fn entries_expire_after_ttl_but_stay_on_disk() {
    let dir = TempDir::new().expect("temp dir");
    let cache = cache_in(&dir);
    let written = at(0);

    cache
        .put_at("rust", vec!["snippet".to_string()], written)
        .expect("put");

    assert!(cache.get_at("rust", written + TimeDelta::hours(23)).is_some());
    assert_eq!(cache.get_at("rust", written + TimeDelta::hours(24)), None);

    let listed = cache.list_at(written + TimeDelta::hours(25));
    assert_eq!(listed.len(), 1);
    assert!(listed[0].stale);
    assert_eq!(listed[0].age, TimeDelta::hours(25));
    let on_disk = fs::read_to_string(cache.path()).expect("cache file");
    assert!(on_disk.contains("snippet"));
}

#[test]
fn put_overwrites_and_refreshes() {
    let dir = TempDir::new().expect("temp dir");
    let cache = cache_in(&dir);

    cache
        .put_at("rust", vec!["old".to_string()], at(0))
        .expect("put");
    cache
        .put_at("RUST", vec!["new".to_string()], at(12))
        .expect("put");

    assert_eq!(
        cache.get_at("rust", at(12) + TimeDelta::hours(20)),
        Some(vec!["new".to_string()])
    );
    assert_eq!(cache.list_at(at(13)).len(), 1);
}

#[test]
fn list_is_oldest_first_then_by_key() {
    let dir = TempDir::new().expect("temp dir");
    let cache = cache_in(&dir);

    cache.put_at("zebra", vec![], at(3)).expect("put");
    cache.put_at("beta", vec![], at(1)).expect("put");
    cache.put_at("alpha", vec![], at(3)).expect("put");

    let queries: Vec<String> = cache
        .list_at(at(4))
        .into_iter()
        .map(|listed| listed.query)
        .collect();
    assert_eq!(queries, vec!["beta", "alpha", "zebra"]);
}

#[test]
fn clear_removes_everything() {
    let dir = TempDir::new().expect("temp dir");
    let cache = cache_in(&dir);
    cache.put("one", vec!["1".to_string()]).expect("put");
    cache.put("two", vec!["2".to_string()]).expect("put");

    assert_eq!(cache.clear().expect("clear"), 2);
    assert!(cache.list().is_empty());
    assert_eq!(cache.get("one"), None);
}

#[test]
fn corrupt_file_reads_as_empty_and_is_overwritten() {
    let dir = TempDir::new().expect("temp dir");
    let cache = cache_in(&dir);
    fs::write(cache.path(), "{ not json").expect("write garbage");

    assert_eq!(cache.get("anything"), None);
    assert!(matches!(
        cache.try_load(),
        Err(YoError::CacheCorruption { .. })
    ));

    cache.put("fresh", vec!["ok".to_string()]).expect("put over garbage");
    assert_eq!(cache.get("fresh"), Some(vec!["ok".to_string()]));
}

#[test]
fn writes_leave_no_temp_files() {
    let dir = TempDir::new().expect("temp dir");
    let cache = cache_in(&dir);

    for i in 0..5 {
        cache.put(&format!("q{i}"), vec![]).expect("put");
    }

    let files = fs::read_dir(dir.path()).expect("read dir").count();
    assert_eq!(files, 1);
}

#[test]
fn config_ttl_and_path_are_used() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = Config::default();
    config.base_dir = dir.path().to_path_buf();
    config.cache.ttl_hours = 2;

    let cache = ContextCache::from_config(&config);

    assert_eq!(cache.path(), dir.path().join("web_cache.json"));
    cache.put_at("q", vec![], at(0)).expect("put");
    assert!(cache.get_at("q", at(1)).is_some());
    assert!(cache.get_at("q", at(2)).is_none());
}
