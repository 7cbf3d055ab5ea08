//! Unit shape tessellation.
//!
//! Every template is centered on the origin with unit extent; per-instance
//! transforms scale and place it.

use std::f64::consts::{PI, TAU};

use glam::DVec3;

/// Number of segments around a cylinder.
pub const CYLINDER_SLICES: u32 = 32;

/// Latitude bands of an ellipsoid.
pub const ELLIPSOID_STACKS: u32 = 16;

/// Longitude segments of an ellipsoid.
pub const ELLIPSOID_SLICES: u32 = 32;

/// Local positions and triangle-list indices of one shape.
#[derive(Debug, Clone)]
pub struct ShapeTemplate {
    pub positions: Vec<DVec3>,
    pub indices: Vec<u32>,
}

impl ShapeTemplate {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Axis-aligned cube spanning `-0.5..=0.5` on every axis.
#[must_use]
pub fn unit_box() -> ShapeTemplate {
    let positions = (0..8u32)
        .map(|i| {
            let axis = |bit: u32| if i & bit == 0 { -0.5 } else { 0.5 };
            DVec3::new(axis(1), axis(2), axis(4))
        })
        .collect();
    #[rustfmt::skip]
    let indices = vec![
        0, 2, 1, 1, 2, 3, // -z
        4, 5, 6, 5, 7, 6, // +z
        0, 1, 4, 1, 5, 4, // -y
        2, 6, 3, 3, 6, 7, // +y
        0, 4, 2, 2, 4, 6, // -x
        1, 3, 5, 3, 7, 5, // +x
    ];
    ShapeTemplate { positions, indices }
}

/// Closed cylinder of radius 1 along the z axis from `-0.5` to `0.5`.
#[must_use]
pub fn unit_cylinder(slices: u32) -> ShapeTemplate {
    let ring = |z: f64| {
        (0..slices).map(move |i| {
            let theta = TAU * f64::from(i) / f64::from(slices);
            DVec3::new(theta.cos(), theta.sin(), z)
        })
    };
    let positions = ring(-0.5).chain(ring(0.5)).collect();

    let mut indices = Vec::with_capacity((6 * slices + 6 * slices.saturating_sub(2)) as usize);
    for i in 0..slices {
        let j = (i + 1) % slices;
        let (bottom_i, bottom_j) = (i, j);
        let (top_i, top_j) = (slices + i, slices + j);
        indices.extend([bottom_i, bottom_j, top_i, bottom_j, top_j, top_i]);
    }
    for k in 1..slices.saturating_sub(1) {
        indices.extend([0, k + 1, k]);
        indices.extend([slices, slices + k, slices + k + 1]);
    }
    ShapeTemplate { positions, indices }
}

/// Unit sphere tessellated on a latitude/longitude grid.
#[must_use]
pub fn unit_ellipsoid(stacks: u32, slices: u32) -> ShapeTemplate {
    let mut positions = Vec::with_capacity(((stacks + 1) * slices) as usize);
    for i in 0..=stacks {
        let phi = PI * f64::from(i) / f64::from(stacks);
        for j in 0..slices {
            let theta = TAU * f64::from(j) / f64::from(slices);
            positions.push(DVec3::new(
                phi.sin() * theta.cos(),
                phi.sin() * theta.sin(),
                phi.cos(),
            ));
        }
    }

    let at = |i: u32, j: u32| i * slices + (j % slices);
    let mut indices = Vec::new();
    for i in 0..stacks {
        for j in 0..slices {
            let (a, b, c, d) = (at(i, j), at(i + 1, j), at(i + 1, j + 1), at(i, j + 1));
            // Pole rows collapse to a point; skip their degenerate halves.
            if i + 1 != stacks {
                indices.extend([a, b, c]);
            }
            if i != 0 {
                indices.extend([a, c, d]);
            }
        }
    }
    ShapeTemplate { positions, indices }
}
