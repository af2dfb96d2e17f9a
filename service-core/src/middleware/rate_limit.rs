use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};
use tokio::task::JoinHandle;

/// Rate limiter keyed by client IP address
pub type IpRateLimiter = Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>>;

/// Bucket shared by every request whose peer address is unknown.
const UNKNOWN_CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Middleware state: the limiter plus how the client address is resolved.
#[derive(Clone)]
pub struct IpRateLimit {
    pub limiter: IpRateLimiter,
    /// Key on the first `x-forwarded-for` entry. Only safe behind a proxy
    /// that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl IpRateLimit {
    pub fn new(limiter: IpRateLimiter, trust_forwarded_for: bool) -> Self {
        Self {
            limiter,
            trust_forwarded_for,
        }
    }
}

/// Create a keyed rate limiter allowing `attempts` per `window_seconds` per IP.
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> Result<IpRateLimiter, AppError> {
    let burst = NonZeroU32::new(attempts).ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!("rate limit attempts must be greater than 0"))
    })?;
    let period = Duration::from_millis((window_seconds.max(1) * 1000) / attempts as u64);
    let quota = Quota::with_period(period)
        .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("rate limit period must be non-zero")))?
        .allow_burst(burst);

    Ok(Arc::new(RateLimiter::dashmap(quota)))
}

/// Periodically drop keys whose quota has fully replenished, so the keyed
/// store stays bounded by the clients seen within one window.
pub fn spawn_rate_limiter_cleanup(limiters: Vec<IpRateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            for limiter in &limiters {
                limiter.retain_recent();
                limiter.shrink_to_fit();
            }
            tracing::debug!("Rate limiter keys pruned");
        }
    })
}

fn client_ip(request: &Request, trust_forwarded_for: bool) -> Option<IpAddr> {
    let forwarded_ip = if trust_forwarded_for {
        request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    } else {
        None
    };

    forwarded_ip.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(rate_limit): State<IpRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(&request, rate_limit.trust_forwarded_for).unwrap_or_else(|| {
        tracing::warn!("Could not determine client IP, using shared bucket");
        UNKNOWN_CLIENT
    });

    match rate_limit.limiter.check_key(&ip) {
        Ok(_) => Ok(next.run(request).await),
        Err(negative) => {
            let wait_time = negative.wait_time_from(DefaultClock::default().now());
            tracing::warn!(ip = %ip, "Rate limit exceeded");
            Err(AppError::TooManyRequests(
                "Too many requests from this IP. Please try again later.".to_string(),
                Some(wait_time.as_secs()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(forwarded_for: Option<&str>, peer: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = forwarded_for {
            builder = builder.header("x-forwarded-for", value);
        }
        if let Some(addr) = peer {
            let addr: SocketAddr = addr.parse().expect("valid socket addr");
            builder = builder.extension(ConnectInfo(addr));
        }
        builder.body(Body::empty()).expect("valid request")
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(create_ip_rate_limiter(0, 60).is_err());
    }

    #[test]
    fn test_burst_then_reject() {
        let limiter = create_ip_rate_limiter(2, 3600).expect("valid quota");
        let ip: IpAddr = "10.0.0.1".parse().expect("valid ip");
        assert!(limiter.check_key(&ip).is_ok());
        assert!(limiter.check_key(&ip).is_ok());
        assert!(limiter.check_key(&ip).is_err());

        let other: IpAddr = "10.0.0.2".parse().expect("valid ip");
        assert!(limiter.check_key(&other).is_ok());
    }

    #[test]
    fn test_forwarded_for_ignored_when_untrusted() {
        let req = request(Some("203.0.113.7"), Some("10.0.0.1:5000"));
        assert_eq!(
            client_ip(&req, false),
            Some("10.0.0.1".parse().expect("valid ip"))
        );

        let req = request(Some("203.0.113.7"), None);
        assert_eq!(client_ip(&req, false), None);
    }

    #[test]
    fn test_forwarded_for_used_when_trusted() {
        let req = request(Some("203.0.113.7, 10.0.0.9"), Some("10.0.0.1:5000"));
        assert_eq!(
            client_ip(&req, true),
            Some("203.0.113.7".parse().expect("valid ip"))
        );

        // Unparseable header falls back to the peer address
        let req = request(Some("garbage"), Some("10.0.0.1:5000"));
        assert_eq!(
            client_ip(&req, true),
            Some("10.0.0.1".parse().expect("valid ip"))
        );
    }

    #[test]
    fn test_retain_recent_prunes_replenished_keys() {
        let limiter = create_ip_rate_limiter(1, 1).expect("valid quota");
        for i in 0..10u8 {
            let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, i));
            assert!(limiter.check_key(&ip).is_ok());
        }
        assert_eq!(limiter.len(), 10);

        std::thread::sleep(Duration::from_millis(1100));
        limiter.retain_recent();
        assert!(limiter.is_empty());
    }
}
