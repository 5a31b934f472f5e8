//! Backend selection module.
//!
//! Every matrix kernel is dispatched to the active backend:
//!
//! - `Cpu` — `rayon` workers walking the kernel geometry (default).
//! - `Wgpu` — compute shaders through `wgpu`, when the `wgpu` feature is
//!   compiled in. Without the feature the selection falls back to `Cpu`.
//!
//! The backend is stored globally in an `AtomicU8`, so switching between CPU
//! and GPU is cheap and can happen between training runs.

use core::sync::atomic::{AtomicU8, Ordering};
use core::{fmt, str::FromStr};

/// Enumeration of supported computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum Backend {
    /// Multi-threaded CPU backend (default).
    #[default]
    Cpu = 0,
    /// GPU backend using `wgpu` compute shaders.
    Wgpu,
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Wgpu),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Wgpu => f.write_str("wgpu"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            other => Err(format!("unknown backend `{other}`")),
        }
    }
}

/// Internal global state for the active backend.
static GLOBAL_BACKEND: AtomicU8 = AtomicU8::new(Backend::Cpu as u8);

/// Sets the active backend used by matrix arithmetic.
///
/// # Example
///
/// ```
/// use gridnet::backend::{set_backend, get_backend, Backend};
/// set_backend(Backend::Cpu);
/// assert_eq!(get_backend(), Backend::Cpu);
/// ```
pub fn set_backend(b: Backend) {
    log::debug!(target: "gridnet::backend", "backend set to {b}");
    GLOBAL_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the currently active backend.
///
/// If the stored value is invalid, defaults to [`Backend::Cpu`].
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names() {
        assert_eq!("cpu".parse::<Backend>(), Ok(Backend::Cpu));
        assert_eq!("WGPU".parse::<Backend>(), Ok(Backend::Wgpu));
        assert!("cuda".parse::<Backend>().is_err());
    }

    #[test]
    fn invalid_discriminant_is_rejected() {
        assert_eq!(Backend::try_from(7), Err(()));
        assert_eq!(Backend::try_from(1), Ok(Backend::Wgpu));
    }
}
