//! presence-core — Face-descriptor matching and attendance state resolution.
//!
//! Pure, synchronous building blocks: the Euclidean comparator, the
//! best-of-all identity matcher, and the check-in/check-out resolver.

pub mod descriptor;
pub mod matcher;
pub mod resolver;
pub mod types;

pub use descriptor::{compare, Descriptor, DescriptorError, DEFAULT_DESCRIPTOR_LEN};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use resolver::{resolve, Decision, Resolver, MAX_CHECKOUT_MINUTES, MINIMUM_CHECKOUT_MINUTES};
pub use types::{AttendanceEvent, CaptureMetrics, EventKind, Identity, IdentitySummary};
