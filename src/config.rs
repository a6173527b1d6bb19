use std::env;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use dotenvy::dotenv;
use strum_macros::EnumString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum StoreBackend {
    Mysql,
    Memory,
}

#[derive(Clone)]
pub struct Config {
    pub server_addr: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub attendance: AttendancePolicy,
    pub fanout_concurrency: usize,

    pub mail_api_url: Option<String>,
    pub mail_from: String,
    /// Upper bound on a single email delivery.
    pub mail_timeout: std::time::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            store_backend: StoreBackend::Memory,
            database_url: None,
            jwt_secret: "change-me".to_string(),
            access_token_ttl: 900,
            refresh_token_ttl: 604_800,
            rate_login_per_min: 60,
            rate_register_per_min: 30,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".to_string(),
            attendance: AttendancePolicy::default(),
            fanout_concurrency: 16,
            mail_api_url: None,
            mail_from: "no-reply@officesphere.io".to_string(),
            mail_timeout: std::time::Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        let store_backend: StoreBackend = parsed("STORE_BACKEND", "mysql")?;
        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Mysql && database_url.is_none() {
            return Err(anyhow!("DATABASE_URL must be set when STORE_BACKEND=mysql"));
        }

        let workday_start = env::var("WORKDAY_START").unwrap_or_else(|_| "09:00".to_string());
        let workday_start = NaiveTime::parse_from_str(&workday_start, "%H:%M")
            .with_context(|| format!("invalid WORKDAY_START value {workday_start:?}"))?;
        let grace_minutes: i64 = parsed("LATE_GRACE_MINUTES", "10")?;

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            store_backend,
            database_url,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed("ACCESS_TOKEN_TTL", "900")?, // default 15 min
            refresh_token_ttl: parsed("REFRESH_TOKEN_TTL", "604800")?, // default 7 days

            rate_login_per_min: parsed("RATE_LOGIN_PER_MIN", "60")?,
            rate_register_per_min: parsed("RATE_REGISTER_PER_MIN", "30")?,
            rate_refresh_per_min: parsed("RATE_REFRESH_PER_MIN", "30")?,
            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", "1000")?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            attendance: AttendancePolicy::new(workday_start, grace_minutes),
            fanout_concurrency: parsed("FANOUT_CONCURRENCY", "16")?,

            mail_api_url: env::var("MAIL_API_URL").ok().filter(|s| !s.is_empty()),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@officesphere.io".to_string()),
            mail_timeout: std::time::Duration::from_secs(parsed("MAIL_TIMEOUT_SECS", "10")?),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e| anyhow!("invalid {key} value {raw:?}: {e}"))
}

/// When the working day starts and how much slack a check-in gets.
#[derive(Debug, Clone, Copy)]
pub struct AttendancePolicy {
    pub workday_start: NaiveTime,
    pub grace: Duration,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self::new(NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(), 10)
    }
}

impl AttendancePolicy {
    pub fn new(workday_start: NaiveTime, grace_minutes: i64) -> Self {
        Self {
            workday_start,
            grace: Duration::minutes(grace_minutes),
        }
    }

    /// Minutes past the start of the day when the check-in falls after the
    /// grace period, `None` when it is on time.
    pub fn minutes_late(&self, check_in: DateTime<Utc>) -> Option<i64> {
        let start = check_in.date_naive().and_time(self.workday_start).and_utc();
        if check_in > start + self.grace {
            Some((check_in - start).num_minutes())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn grace_period_is_inclusive() {
        let policy = AttendancePolicy::default();
        assert_eq!(policy.minutes_late(at(8, 55)), None);
        assert_eq!(policy.minutes_late(at(9, 5)), None);
        assert_eq!(policy.minutes_late(at(9, 10)), None);
        assert_eq!(policy.minutes_late(at(9, 15)), Some(15));
    }

    #[test]
    fn custom_start_time_moves_the_threshold() {
        let policy = AttendancePolicy::new(NaiveTime::from_hms_opt(10, 30, 0).unwrap(), 0);
        assert_eq!(policy.minutes_late(at(10, 30)), None);
        assert_eq!(policy.minutes_late(at(10, 45)), Some(15));
    }
}
