//! Host-side implementation of the real-time streaming protocol core:
//! pose history/prediction, IDR handling, frame pacing, tracking control
//! and foveation, wired together by [`session::HostSession`].

pub mod foveation;
pub mod idr;
pub mod logging;
pub mod pacing;
pub mod pose;
pub mod session;
pub mod tracking;
