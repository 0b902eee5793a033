//! This crate contains computational geometry algorithms for two-view reconstruction.
//!
//! ## Triangulation
//!
//! In this problem we know the projection matrices of two cameras and the normalized image
//! coordinates of the same feature observed by each. We want to find the 3d point whose
//! projections agree best with both observations. See [`triangulation::IterativeLinearTriangulator`].

#![no_std]

pub mod triangulation;
