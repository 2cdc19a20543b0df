//! 交易日历（沪深市场，北京时间 UTC+8）
//!
//! 节假日表不在此处维护，周末以外的日期都视为交易日

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Timelike, Utc,
    Weekday,
};

/// 北京时间偏移
pub fn market_offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap_or_else(|| Utc.fix())
}

/// 当前北京时间
pub fn now_market() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&market_offset())
}

/// 转换为北京时间
pub fn to_market(ts: DateTime<Utc>) -> DateTime<FixedOffset> {
    ts.with_timezone(&market_offset())
}

/// 交易日标识，如 20260119，用于按日幂等的缓存键
pub fn trading_day_key(ts: DateTime<Utc>) -> String {
    to_market(ts).format("%Y%m%d").to_string()
}

/// 是否交易日（周一至周五）
pub fn is_trading_day(ts: DateTime<Utc>) -> bool {
    !matches!(to_market(ts).weekday(), Weekday::Sat | Weekday::Sun)
}

/// 是否处于连续竞价时段：09:30-11:30, 13:00-15:00
pub fn is_trading_time(ts: DateTime<Utc>) -> bool {
    if !is_trading_day(ts) {
        return false;
    }
    let local = to_market(ts);
    let minutes = local.hour() * 60 + local.minute();
    let morning = (9 * 60 + 30)..(11 * 60 + 30);
    let afternoon = (13 * 60)..(15 * 60);
    morning.contains(&minutes) || afternoon.contains(&minutes)
}

/// 北京时间是否落在 [start, end) 区间内
pub fn is_within_window(ts: DateTime<Utc>, start: NaiveTime, end: NaiveTime) -> bool {
    let t = to_market(ts).time();
    t >= start && t < end
}

/// 北京时间是否已过指定时刻
pub fn is_after(ts: DateTime<Utc>, at: NaiveTime) -> bool {
    to_market(ts).time() >= at
}

/// 当日（北京时间）零点对应的 UTC 时间
pub fn market_day_start_utc(ts: DateTime<Utc>) -> DateTime<Utc> {
    let local = to_market(ts);
    let midnight = local.date_naive().and_time(NaiveTime::MIN);
    market_offset()
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(ts)
}

/// 距离当日（北京时间）结束的秒数，至少 1 秒，用作按日标记的 TTL
pub fn secs_until_market_day_end(ts: DateTime<Utc>) -> u64 {
    let end = market_day_start_utc(ts) + Duration::days(1);
    (end - ts).num_seconds().max(1) as u64
}
