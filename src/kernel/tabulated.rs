use super::Kernel;

const TABLE_SIZE: usize = 1000;

/// Uniformly sampled, linearly interpolated backend for all kernel
/// functions. Built once from the analytic kernel; lookups replace the
/// piecewise polynomial evaluation in the hot loops.
#[derive(Debug, Clone)]
pub struct TabulatedKernel {
    inv_ds: f64,
    kernrange: f64,
    w0: Vec<f64>,
    w1: Vec<f64>,
    womega: Vec<f64>,
    wgrav: Vec<f64>,
    wpot: Vec<f64>,
}

impl TabulatedKernel {
    pub fn new(kernel: &Kernel) -> Self {
        let kernrange = kernel.kernrange();
        let ds = kernrange / (TABLE_SIZE - 1) as f64;
        let sample = |f: &dyn Fn(f64) -> f64| -> Vec<f64> {
            (0..TABLE_SIZE).map(|i| f(i as f64 * ds)).collect()
        };
        Self {
            inv_ds: 1.0 / ds,
            kernrange,
            w0: sample(&|s| kernel.w0_analytic(s)),
            w1: sample(&|s| kernel.w1_analytic(s)),
            womega: sample(&|s| kernel.womega_analytic(s)),
            wgrav: sample(&|s| kernel.wgrav_analytic(s)),
            wpot: sample(&|s| kernel.wpot_analytic(s)),
        }
    }

    fn lookup(&self, values: &[f64], s: f64) -> f64 {
        let x = s * self.inv_ds;
        let i = x as usize;
        if i >= TABLE_SIZE - 1 {
            return values[TABLE_SIZE - 1];
        }
        let frac = x - i as f64;
        values[i] * (1.0 - frac) + values[i + 1] * frac
    }

    pub fn w0(&self, s: f64) -> f64 {
        if s >= self.kernrange {
            return 0.0;
        }
        self.lookup(&self.w0, s)
    }

    pub fn w1(&self, s: f64) -> f64 {
        if s >= self.kernrange {
            return 0.0;
        }
        self.lookup(&self.w1, s)
    }

    pub fn womega(&self, s: f64) -> f64 {
        if s >= self.kernrange {
            return 0.0;
        }
        self.lookup(&self.womega, s)
    }

    pub fn wgrav(&self, s: f64) -> f64 {
        if s >= self.kernrange {
            return 1.0 / (s * s);
        }
        self.lookup(&self.wgrav, s)
    }

    pub fn wpot(&self, s: f64) -> f64 {
        if s >= self.kernrange {
            return 1.0 / s;
        }
        self.lookup(&self.wpot, s)
    }
}

#[cfg(test)]
mod tests {
    use crate::kernel::Kernel;
    use crate::parameters::KernelKind;
    use crate::test_utils::assert_close_tol;

    #[test]
    fn tabulated_backend_agrees_with_analytic() {
        for kind in [KernelKind::M4, KernelKind::Quintic, KernelKind::Gaussian] {
            for ndim in 1..=3 {
                let analytic = Kernel::new(kind, ndim, false);
                let tabulated = Kernel::new(kind, ndim, true);
                let n = 500;
                for i in 0..n {
                    let s = analytic.kernrange() * (i as f64 + 0.5) / n as f64;
                    assert_close_tol(tabulated.w0(s), analytic.w0(s), 1e-4);
                    assert_close_tol(tabulated.w1(s), analytic.w1(s), 1e-3);
                    assert_close_tol(tabulated.wgrav(s), analytic.wgrav(s), 1e-4);
                    assert_close_tol(tabulated.wpot(s), analytic.wpot(s), 1e-4);
                }
            }
        }
    }
}
