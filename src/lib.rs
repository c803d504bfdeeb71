//! Faucet Orchestrator
//!
//! Runs concurrent claiming sessions against a registry of reward faucets,
//! honoring per-faucet cooldowns and rotating through a pool of proxies.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── http.rs        - Proxy-aware HTTP fetcher
//! ├── captcha.rs     - CAPTCHA solver contract and simulated solver
//! ├── faucet/        - Faucet definitions
//! │   ├── registry.rs - Shared registry with unique ids
//! │   └── catalog.rs  - Built-in faucet catalogue
//! ├── proxy/         - Proxy pool
//! │   ├── pool.rs     - Snapshot-swapped pool with selection policies
//! │   └── source.rs   - Listing sources feeding the pool
//! ├── claim/         - Claim execution
//! │   ├── executor.rs - Executor contract, HTTP and simulated executors
//! │   └── locator.rs  - Element locator matching
//! ├── session/       - Claim sessions
//! │   ├── state.rs      - Session record and lifecycle
//! │   ├── scheduler.rs  - Per-session scheduling loop
//! │   ├── supervisor.rs - Session creation, stop and statistics
//! │   └── error.rs      - Scheduler and supervisor errors
//! └── api/           - HTTP API endpoints
//!     ├── faucets.rs    - Registry listing and additions
//!     ├── sessions.rs   - Session control
//!     ├── system.rs     - Health, stats and proxy control
//!     └── middleware.rs - Rate limiting, headers, logging
//! ```

pub mod api;
pub mod captcha;
pub mod claim;
pub mod config;
pub mod faucet;
pub mod http;
pub mod proxy;
pub mod session;

// Re-export main types for convenience
pub use config::{ExecutorMode, OrchestratorConfig};

pub use captcha::{CaptchaSolution, CaptchaSolver, SimulatedCaptchaSolver};
pub use claim::{ClaimExecutor, ClaimOutcome, HttpClaimExecutor, SimulatedClaimExecutor};
pub use faucet::{FaucetDefinition, FaucetRegistry, RegistryError};
pub use http::{HttpFetchConfig, HttpFetcher};
pub use proxy::{HttpProxySource, ProxyPool, ProxySelection, ProxySource};

pub use session::{
    AggregateStats, ClaimSession, Clock, SchedulerConfig, SchedulerError, SchedulingLoop,
    SessionSnapshot, SessionStatus, SessionSupervisor, SupervisorConfig, SupervisorError,
    SystemClock,
};

// Re-export API types
pub use api::{ApiState, SecurityMiddlewareConfig, SecurityState, create_router};
