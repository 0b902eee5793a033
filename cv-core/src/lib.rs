//! # Two-view core types
//!
//! This library provides the small set of types shared by every crate in the two-view
//! reconstruction workspace: pixel keypoints, correspondences between two images,
//! homogeneous 3d points, camera poses, and the traits that camera models and
//! triangulators implement. It is `#![no_std]` and needs no allocator so that the
//! numeric crates built on it stay `#![no_std]` as well.
//!
//! ## Conventions
//!
//! The reference camera of a pair is the identity pose `[I|0]`. The second camera
//! is described by a [`CameraToCamera`] pose `[R|t]` which maps a [`CameraPoint`] of the
//! reference camera into the frame of the second camera, so that a normalized image
//! coordinate `x'` in the second image satisfies `x' ~ R * X + t`.
//!
//! Camera space follows the usual computer vision layout: the positive `z` axis is
//! forwards, `y` is down and `x` is right. A point is "in front" of a camera when its
//! depth (`z` in that camera's frame) is positive.
//!
//! ## Triangulation
//!
//! Two cameras observe the same feature. Each observation is a normalized image coordinate
//! on the virtual image plane (`z = 1`) of its camera. Triangulation recovers the 3d point
//! `p` whose projections best agree with both observations:
//!
//! - `p` the point we are trying to triangulate
//! - `a` the normalized keypoint on camera A
//! - `b` the normalized keypoint on camera B
//! - `O` the optical center of a camera
//! - `@` the virtual image plane
//!
//! ```text
//!                        @
//!                        @
//!               p--------b--------O
//!              /         @
//!             /          @
//!            /           @
//!           /            @
//!   @@@@@@@a@@@@@
//!         /
//!        /
//!       /
//!      O
//! ```

#![no_std]

mod camera;
mod keypoint;
mod matches;
mod point;
mod pose;
mod triangulation;

pub use camera::*;
pub use keypoint::*;
pub use matches::*;
pub use nalgebra;
pub use point::*;
pub use pose::*;
pub use sample_consensus;
pub use triangulation::*;
