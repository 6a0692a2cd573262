use std::sync::Arc;

use crate::discretization::mesh::{BoundarySide, Face};

/// Field identifier stored as a runtime string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field(pub Arc<str>);

impl Field {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl<T: Into<Arc<str>>> From<T> for Field {
    fn from(name: T) -> Self {
        Field::new(name)
    }
}

/// Boundary condition `alpha·u + beta·∂u/∂n = gamma` on the outward normal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeneralizedBC {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl GeneralizedBC {
    pub fn dirichlet(g: f64) -> Self {
        Self {
            alpha: 1.0,
            beta: 0.0,
            gamma: g,
        }
    }

    /// Face value as an affine function of the adjacent cell value,
    /// `u_f = slope·u_P + offset`, for a cell centre `delta` away from the face.
    #[inline]
    pub fn face_value(&self, delta: f64) -> (f64, f64) {
        if self.beta == 0.0 {
            (0.0, self.gamma / self.alpha)
        } else {
            let denom = self.alpha + self.beta / delta;
            ((self.beta / delta) / denom, self.gamma / denom)
        }
    }
}

#[derive(Clone, Debug)]
pub struct BCRule {
    pub field: Field,
    pub side: BoundarySide,
    pub bc: GeneralizedBC,
}

/// Boundary conditions by field. Faces without a matching rule are zero flux;
/// later rules take precedence.
#[derive(Default, Clone, Debug)]
pub struct BCRegistry {
    rules: Vec<BCRule>,
}

impl BCRegistry {
    pub fn add(&mut self, rule: BCRule) {
        self.rules.push(rule);
    }

    pub fn with(mut self, field: impl Into<Field>, side: BoundarySide, bc: GeneralizedBC) -> Self {
        self.add(BCRule {
            field: field.into(),
            side,
            bc,
        });
        self
    }

    pub fn find_for<'a>(&'a self, field: &str, face: &Face) -> Option<&'a BCRule> {
        let side = face.boundary?;
        self.rules
            .iter()
            .rev()
            .find(|r| r.side == side && r.field.name() == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    fn top_face() -> Face {
        Face {
            area: 1.0,
            normal: DVec2::Y,
            neighbor_cell_ids: (0, None),
            centroid: DVec2::new(0.5, 1.0),
            boundary: Some(BoundarySide::Top),
        }
    }

    #[test]
    fn select_bc_by_field_and_side() {
        let reg = BCRegistry::default()
            .with("cupric", BoundarySide::Top, GeneralizedBC::dirichlet(1000.0))
            .with("suppressor", BoundarySide::Bottom, GeneralizedBC::dirichlet(0.02));

        let rule = reg.find_for("cupric", &top_face()).expect("rule not found");
        assert_eq!(rule.bc.gamma, 1000.0);
        assert!(reg.find_for("suppressor", &top_face()).is_none());
        assert!(reg.find_for("potential", &top_face()).is_none());
    }

    #[test]
    fn later_rules_override_earlier_rules() {
        let mut reg = BCRegistry::default().with("cupric", BoundarySide::Top, GeneralizedBC::dirichlet(1.0));
        reg.add(BCRule {
            field: Field::from("cupric"),
            side: BoundarySide::Top,
            bc: GeneralizedBC::dirichlet(2.0),
        });
        assert_eq!(reg.find_for("cupric", &top_face()).unwrap().bc.gamma, 2.0);
    }

    #[test]
    fn face_values_are_affine_in_the_cell_value() {
        assert_eq!(GeneralizedBC::dirichlet(3.0).face_value(0.5), (0.0, 3.0));
        // u + ∂u/∂n = 4 with the cell centre 0.5 away: u_f = (2·u_P + 4)/3
        let robin = GeneralizedBC {
            alpha: 1.0,
            beta: 1.0,
            gamma: 4.0,
        };
        let (slope, offset) = robin.face_value(0.5);
        assert!((slope - 2.0 / 3.0).abs() < 1e-15);
        assert!((offset - 4.0 / 3.0).abs() < 1e-15);
    }
}
