//! Rotating User-Agent pool.
//!
//! The lookup endpoint varies behavior by client signature; rotating
//! through a pool of plausible browser identifiers reduces correlation
//! between consecutive probes.

use rand::Rng;

/// Fallback identifier used if the pool was built empty.
const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const PLATFORMS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Macintosh; Intel Mac OS X 13_5",
    "X11; Linux x86_64",
    "iPhone; CPU iPhone OS 17_5 like Mac OS X",
];

/// A fixed pool of pre-generated browser User-Agent strings.
pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    /// Generate a pool of `size` randomized browser identifiers.
    #[must_use]
    pub fn generate(size: usize) -> Self {
        let mut rng = rand::rng();
        let agents = (0..size).map(|_| random_user_agent(&mut rng)).collect();
        Self { agents }
    }

    /// Pick one identifier at random.
    #[must_use]
    pub fn pick(&self) -> &str {
        if self.agents.is_empty() {
            return FALLBACK_USER_AGENT;
        }
        let mut rng = rand::rng();
        &self.agents[rng.random_range(0..self.agents.len())]
    }

    /// Number of identifiers in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

fn random_user_agent(rng: &mut impl Rng) -> String {
    let platform = PLATFORMS[rng.random_range(0..PLATFORMS.len())];
    match rng.random_range(0..4) {
        0 => format!(
            "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.{}.{} Safari/537.36",
            rng.random_range(100..=120),
            rng.random_range(1000..=6000),
            rng.random_range(0..=200),
        ),
        1 => format!(
            "Mozilla/5.0 ({platform}) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{}.{} Safari/605.1.15",
            rng.random_range(14..=18),
            rng.random_range(0..=9),
        ),
        2 => format!(
            "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.{}.{} Safari/537.36 Edg/{}.0.{}.{}",
            rng.random_range(100..=120),
            rng.random_range(1000..=6000),
            rng.random_range(0..=200),
            rng.random_range(100..=120),
            rng.random_range(1000..=6000),
            rng.random_range(0..=200),
        ),
        _ => {
            let version = rng.random_range(90..=118);
            format!("Mozilla/5.0 ({platform}; rv:{version}.0) Gecko/20100101 Firefox/{version}.0")
        }
    }
}
