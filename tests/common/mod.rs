//! Common test utilities

#![allow(dead_code)]

use serde_json::{json, Value};
use warplog::config::Config;
use warplog::models::PullRecord;

/// Path of the default history endpoint on the mock server
pub const DEFAULT_PATH: &str = "/common/gacha_record/api/getGachaLog";

/// Path of the collaboration history endpoint on the mock server
pub const COLLAB_PATH: &str = "/common/gacha_record/api/getLdGachaLog";

/// History link pointing at a mock server
pub fn link(base: &str) -> String {
    format!("{base}{DEFAULT_PATH}?authkey_ver=1&authkey=abc%2Bdef&lang=ko&game_biz=hkrpg_global")
}

/// Raw API record
pub fn raw(id: &str, name: &str, rank: u8, time: &str, gacha_type: &str) -> Value {
    json!({
        "uid": "100000001",
        "gacha_id": "2003",
        "gacha_type": gacha_type,
        "item_id": "1003",
        "count": "1",
        "time": time,
        "name": name,
        "lang": "en",
        "item_type": "Character",
        "rank_type": rank.to_string(),
        "id": id,
    })
}

/// Successful page envelope
pub fn page(list: Vec<Value>) -> Value {
    json!({
        "retcode": 0,
        "message": "OK",
        "data": { "page": "1", "size": "20", "region": "prod_official_asia", "list": list },
    })
}

/// Error envelope with `data: null`
pub fn api_error(retcode: i64, message: &str) -> Value {
    json!({ "retcode": retcode, "message": message, "data": null })
}

/// Config with no delays and short timeouts
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.api.page_delay_ms = 0;
    config.api.category_delay_ms = 0;
    config.api.request_timeout_secs = 2;
    config.api.probe_timeout_secs = 2;
    config
}

/// Newest-first history of `len` pulls with top-rarity pulls at `tops`
pub fn history(len: usize, tops: &[usize]) -> Vec<PullRecord> {
    (0..len)
        .map(|i| {
            let rank = if tops.contains(&i) { 5 } else { 3 };
            let time = format!("2024-05-01 12:{:02}:00", 59 - i);
            PullRecord::new(format!("17000000000000{:05}", 99_999 - i), format!("item{i}"), rank, time, "11")
        })
        .collect()
}
