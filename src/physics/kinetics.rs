use num_dual::{Dual64, DualNum};

/// Asymmetric Butler–Volmer law for copper reduction with a coverage-dependent
/// exchange current, `I0 = i0 + i1·θ`.
///
/// Positive overpotential `ψ` gives positive (deposition) current.
#[derive(Debug, Clone, Copy)]
pub struct ButlerVolmer {
    pub i0: f64,
    pub i1: f64,
    /// `α·F/(R·T)`
    pub forward: f64,
    /// `(2 − α)·F/(R·T)`
    pub backward: f64,
    pub bulk_cupric: f64,
    /// `ω/(n·F)`, metres per second per A/m².
    pub volume_per_charge: f64,
}

/// Physical inputs of [`ButlerVolmer`].
#[derive(Debug, Clone, Copy)]
pub struct KineticConstants {
    pub i0: f64,
    pub i1: f64,
    /// Transfer coefficient of the forward reaction.
    pub alpha: f64,
    pub charge: f64,
    pub faradays_constant: f64,
    pub gas_constant: f64,
    pub temperature: f64,
    pub bulk_cupric: f64,
    /// Molar volume of the deposit.
    pub omega: f64,
}

impl From<KineticConstants> for ButlerVolmer {
    fn from(k: KineticConstants) -> Self {
        let f_bar = k.faradays_constant / k.gas_constant / k.temperature;
        Self {
            i0: k.i0,
            i1: k.i1,
            forward: k.alpha * f_bar,
            backward: (2.0 - k.alpha) * f_bar,
            bulk_cupric: k.bulk_cupric,
            volume_per_charge: k.omega / (k.charge * k.faradays_constant),
        }
    }
}

impl ButlerVolmer {
    #[inline]
    pub fn exchange_current(&self, interface_theta: f64) -> f64 {
        self.i0 + self.i1 * interface_theta
    }

    /// Current at bulk concentration and its derivative with respect to `ψ`.
    /// The local current density scales this by `c/c∞`.
    pub fn base_current(&self, psi: f64, interface_theta: f64) -> (f64, f64) {
        let x = Dual64::from_re(psi).derivative();
        let i = ((x * self.forward).exp() - (x * -self.backward).exp()) * self.exchange_current(interface_theta);
        (i.re, i.eps)
    }

    /// Normal growth velocity of the deposit for a current density.
    #[inline]
    pub fn deposition_rate(&self, current_density: f64) -> f64 {
        current_density * self.volume_per_charge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn law() -> ButlerVolmer {
        ButlerVolmer::from(KineticConstants {
            i0: 40.0,
            i1: -40.0,
            alpha: 0.4,
            charge: 2.0,
            faradays_constant: 9.6485e4,
            gas_constant: 8.314,
            temperature: 298.0,
            bulk_cupric: 1000.0,
            omega: 7.1e-6,
        })
    }

    #[test]
    fn derivative_matches_closed_form() {
        let bv = law();
        let psi = 0.2;
        let (i, di) = bv.base_current(psi, 0.25);
        let i0 = 40.0 - 40.0 * 0.25;
        let ef = (bv.forward * psi).exp();
        let eb = (-bv.backward * psi).exp();
        assert_relative_eq!(i, i0 * (ef - eb), max_relative = 1e-12);
        assert_relative_eq!(di, i0 * (bv.forward * ef + bv.backward * eb), max_relative = 1e-12);
    }

    #[test]
    fn rate_constants_follow_the_transfer_coefficient() {
        let bv = law();
        assert_relative_eq!(bv.forward + bv.backward, 2.0 * 9.6485e4 / 8.314 / 298.0, max_relative = 1e-12);
        assert_relative_eq!(bv.forward / bv.backward, 0.4 / 1.6, max_relative = 1e-12);
        assert_relative_eq!(bv.deposition_rate(1.0), 7.1e-6 / (2.0 * 9.6485e4), max_relative = 1e-12);
    }

    #[test]
    fn equilibrium_and_full_coverage_give_no_current() {
        let bv = law();
        assert_eq!(bv.base_current(0.0, 0.0).0, 0.0);
        assert_eq!(bv.base_current(0.3, 1.0).0, 0.0);
        assert!(bv.deposition_rate(bv.base_current(0.25, 0.0).0) > 0.0);
    }
}
