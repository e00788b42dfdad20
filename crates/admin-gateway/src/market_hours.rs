//! CME Globex 거래 시간 판단.
//!
//! 모든 판단은 미국 중부 시간(America/Chicago) 기준입니다.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::America::Chicago;

/// 일일 점검 시작 (16:00 CT, 분 단위)
const MAINTENANCE_START: u32 = 16 * 60;
/// 일일 점검 종료 / 세션 재개 (17:00 CT)
const MAINTENANCE_END: u32 = 17 * 60;
/// 정규장 시작 (08:30 CT)
const REGULAR_OPEN: u32 = 8 * 60 + 30;
/// 정규장 종료 (15:15 CT)
const REGULAR_CLOSE: u32 = 15 * 60 + 15;

/// 부활절 일요일 (그레고리력, 익명 알고리즘).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year.rem_euclid(19);
    let b = year.div_euclid(100);
    let c = year.rem_euclid(100);
    let (d, e) = (b / 4, b % 4);
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let (i, k) = (c / 4, c % 4);
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let n = h + l - 7 * m + 114;
    NaiveDate::from_ymd_opt(year, (n / 31) as u32, (n % 31 + 1) as u32)
}

/// 전일 휴장일 여부 (중부 시간 기준 날짜).
///
/// New Year (1/1), Good Friday (부활절 2일 전), Christmas (12/25).
pub fn is_holiday(date: NaiveDate) -> bool {
    match (date.month(), date.day()) {
        (1, 1) | (12, 25) => true,
        _ => easter_sunday(date.year())
            .map(|easter| date == easter - Duration::days(2))
            .unwrap_or(false),
    }
}

/// 해당 시각에 Globex가 열려 있는지 확인합니다.
pub fn is_market_open(at: DateTime<Utc>) -> bool {
    let local = at.with_timezone(&Chicago);
    if is_holiday(local.date_naive()) {
        return false;
    }

    let minutes = local.hour() * 60 + local.minute();

    // 금요일 16:00 ~ 일요일 17:00 주말 휴장
    match local.weekday() {
        Weekday::Sat => return false,
        Weekday::Fri if minutes >= MAINTENANCE_START => return false,
        Weekday::Sun if minutes < MAINTENANCE_END => return false,
        _ => {}
    }

    !(MAINTENANCE_START..MAINTENANCE_END).contains(&minutes)
}

/// `[start, end)` 구간 중 한 번이라도 시장이 열려 있는지 확인합니다.
///
/// 구간 시작과 이후 매 정시를 확인합니다.
pub fn is_market_open_during(start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    if end <= start {
        return is_market_open(start);
    }

    if is_market_open(start) {
        return true;
    }

    let mut cursor = start
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(start)
        + Duration::hours(1);

    while cursor < end {
        if is_market_open(cursor) {
            return true;
        }
        cursor += Duration::hours(1);
    }
    false
}

/// 정규장 시간 (평일 08:30 ~ 15:15 CT) 여부.
pub fn is_regular_hours(at: DateTime<Utc>) -> bool {
    let local = at.with_timezone(&Chicago);
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) || is_holiday(local.date_naive()) {
        return false;
    }
    let minutes = local.hour() * 60 + local.minute();
    (REGULAR_OPEN..REGULAR_CLOSE).contains(&minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// 중부 시간으로 시각을 만듭니다.
    fn ct(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Chicago
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_weekday_session() {
        // 2024-03-05 화요일
        assert!(is_market_open(ct(2024, 3, 5, 10, 0)));
        assert!(is_market_open(ct(2024, 3, 5, 2, 0)));
        assert!(!is_market_open(ct(2024, 3, 5, 16, 30)));
        assert!(is_market_open(ct(2024, 3, 5, 17, 0)));
    }

    #[test]
    fn test_weekend_closure() {
        // 2024-03-08 금요일, 03-09 토요일, 03-10 일요일
        assert!(is_market_open(ct(2024, 3, 8, 15, 59)));
        assert!(!is_market_open(ct(2024, 3, 8, 16, 0)));
        assert!(!is_market_open(ct(2024, 3, 9, 12, 0)));
        assert!(!is_market_open(ct(2024, 3, 10, 16, 59)));
        assert!(is_market_open(ct(2024, 3, 10, 17, 0)));
    }

    #[test]
    fn test_holidays() {
        assert!(!is_market_open(ct(2024, 12, 25, 10, 0)));
        assert!(!is_market_open(ct(2025, 4, 18, 10, 0)));
        assert!(is_market_open(ct(2024, 12, 26, 10, 0)));
    }

    #[test]
    fn test_easter_sunday() {
        let cases = [
            (2024, 3, 31),
            (2025, 4, 20),
            (2026, 4, 5),
            (2027, 3, 28),
            (2030, 4, 21),
            (2038, 4, 25),
        ];
        for (y, m, d) in cases {
            assert_eq!(easter_sunday(y), NaiveDate::from_ymd_opt(y, m, d), "{}", y);
        }
    }

    #[test]
    fn test_holidays_follow_rules_in_later_years() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert!(is_holiday(date(2027, 3, 26)));
        assert!(is_holiday(date(2030, 4, 19)));
        assert!(is_holiday(date(2031, 12, 25)));
        assert!(is_holiday(date(2032, 1, 1)));
        assert!(!is_holiday(date(2027, 3, 28)));
        assert!(!is_holiday(date(2030, 4, 18)));

        // 2030-04-19 금요일 정규장 시간에도 닫혀 있음
        assert!(!is_market_open(ct(2030, 4, 19, 10, 0)));
        assert!(!is_regular_hours(ct(2030, 4, 19, 10, 0)));
        assert!(is_market_open(ct(2030, 4, 18, 10, 0)));
    }

    #[test]
    fn test_open_during_window() {
        // 토요일 전체는 닫혀 있음
        assert!(!is_market_open_during(ct(2024, 3, 9, 0, 0), ct(2024, 3, 9, 23, 0)));
        // 토요일 18시부터 6시간이면 일요일 0시까지, 여전히 닫힘
        assert!(!is_market_open_during(ct(2024, 3, 9, 18, 0), ct(2024, 3, 10, 0, 0)));
        // 일요일 14시 ~ 20시: 17시에 열림
        assert!(is_market_open_during(ct(2024, 3, 10, 14, 0), ct(2024, 3, 10, 20, 0)));
    }

    #[test]
    fn test_regular_hours() {
        assert!(is_regular_hours(ct(2024, 3, 5, 8, 30)));
        assert!(is_regular_hours(ct(2024, 3, 5, 15, 14)));
        assert!(!is_regular_hours(ct(2024, 3, 5, 15, 15)));
        assert!(!is_regular_hours(ct(2024, 3, 5, 20, 0)));
        assert!(!is_regular_hours(ct(2024, 3, 10, 10, 0)));
    }
}
