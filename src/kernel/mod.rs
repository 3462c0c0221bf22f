mod tabulated;

use std::f64::consts::PI;

pub use tabulated::TabulatedKernel;

use crate::parameters::KernelKind;

/// Smoothing kernel W(s) with s = r/h, its derivative, the dW/dh
/// combination, and the 3-D softened gravity family (force, potential and
/// the zeta correction). All functions carry the dimension normalization;
/// callers divide by the appropriate power of h.
#[derive(Debug, Clone)]
pub struct Kernel {
    kind: KernelKind,
    ndim: usize,
    norm: f64,
    kernrange: f64,
    grav: Option<GravTable>,
    table: Option<TabulatedKernel>,
}

fn norm_for(kind: KernelKind, ndim: usize) -> f64 {
    match kind {
        KernelKind::M4 => match ndim {
            1 => 2.0 / 3.0,
            2 => 10.0 / (7.0 * PI),
            _ => 1.0 / PI,
        },
        KernelKind::Quintic => match ndim {
            1 => 1.0 / 120.0,
            2 => 7.0 / (478.0 * PI),
            _ => 1.0 / (120.0 * PI),
        },
        KernelKind::Gaussian => match ndim {
            1 => 1.0 / PI.sqrt(),
            2 => 1.0 / PI,
            _ => 1.0 / (PI * PI.sqrt()),
        },
    }
}

fn range_for(kind: KernelKind) -> f64 {
    match kind {
        KernelKind::M4 => 2.0,
        KernelKind::Quintic | KernelKind::Gaussian => 3.0,
    }
}

fn w0_shape(kind: KernelKind, s: f64) -> f64 {
    match kind {
        KernelKind::M4 => {
            if s < 1.0 {
                1.0 - 1.5 * s * s + 0.75 * s * s * s
            } else if s < 2.0 {
                0.25 * (2.0 - s).powi(3)
            } else {
                0.0
            }
        }
        KernelKind::Quintic => {
            if s < 1.0 {
                (3.0 - s).powi(5) - 6.0 * (2.0 - s).powi(5) + 15.0 * (1.0 - s).powi(5)
            } else if s < 2.0 {
                (3.0 - s).powi(5) - 6.0 * (2.0 - s).powi(5)
            } else if s < 3.0 {
                (3.0 - s).powi(5)
            } else {
                0.0
            }
        }
        KernelKind::Gaussian => {
            if s < 3.0 {
                (-s * s).exp()
            } else {
                0.0
            }
        }
    }
}

fn w1_shape(kind: KernelKind, s: f64) -> f64 {
    match kind {
        KernelKind::M4 => {
            if s < 1.0 {
                -3.0 * s + 2.25 * s * s
            } else if s < 2.0 {
                -0.75 * (2.0 - s) * (2.0 - s)
            } else {
                0.0
            }
        }
        KernelKind::Quintic => {
            if s < 1.0 {
                -5.0 * ((3.0 - s).powi(4) - 6.0 * (2.0 - s).powi(4) + 15.0 * (1.0 - s).powi(4))
            } else if s < 2.0 {
                -5.0 * ((3.0 - s).powi(4) - 6.0 * (2.0 - s).powi(4))
            } else if s < 3.0 {
                -5.0 * (3.0 - s).powi(4)
            } else {
                0.0
            }
        }
        KernelKind::Gaussian => {
            if s < 3.0 {
                -2.0 * s * (-s * s).exp()
            } else {
                0.0
            }
        }
    }
}

/// Numerically integrated enclosed-mass and potential tables for the
/// softened-gravity family of kernels without closed forms. The 3-D kernel
/// shape is used regardless of the hydrodynamic dimensionality.
#[derive(Debug, Clone)]
struct GravTable {
    ds: f64,
    kernrange: f64,
    enclosed_mass: Vec<f64>,
    pot_tail: Vec<f64>,
}

const GRAV_TABLE_SIZE: usize = 2048;

impl GravTable {
    fn new(kind: KernelKind) -> Self {
        let kernrange = range_for(kind);
        let norm3 = norm_for(kind, 3);
        let ds = kernrange / (GRAV_TABLE_SIZE - 1) as f64;
        let w3 = |s: f64| norm3 * w0_shape(kind, s);
        // Cumulative trapezoid of 4 pi s^2 W(s) from the centre outwards.
        let mut enclosed_mass = vec![0.0; GRAV_TABLE_SIZE];
        for i in 1..GRAV_TABLE_SIZE {
            let s0 = (i - 1) as f64 * ds;
            let s1 = i as f64 * ds;
            let segment = 0.5 * ds * (4.0 * PI * s0 * s0 * w3(s0) + 4.0 * PI * s1 * s1 * w3(s1));
            enclosed_mass[i] = enclosed_mass[i - 1] + segment;
        }
        // Tail integral of 4 pi s W(s) from s to the kernel edge.
        let mut pot_tail = vec![0.0; GRAV_TABLE_SIZE];
        for i in (0..GRAV_TABLE_SIZE - 1).rev() {
            let s0 = i as f64 * ds;
            let s1 = (i + 1) as f64 * ds;
            let segment = 0.5 * ds * (4.0 * PI * s0 * w3(s0) + 4.0 * PI * s1 * w3(s1));
            pot_tail[i] = pot_tail[i + 1] + segment;
        }
        // Rescale so the enclosed mass reaches exactly unity at the edge;
        // the truncated gaussian would otherwise fall short.
        let total = enclosed_mass[GRAV_TABLE_SIZE - 1];
        for value in enclosed_mass.iter_mut().chain(pot_tail.iter_mut()) {
            *value /= total;
        }
        Self {
            ds,
            kernrange,
            enclosed_mass,
            pot_tail,
        }
    }

    fn lookup(&self, values: &[f64], s: f64) -> f64 {
        let x = (s / self.ds).min((GRAV_TABLE_SIZE - 1) as f64);
        let i = (x as usize).min(GRAV_TABLE_SIZE - 2);
        let frac = x - i as f64;
        values[i] * (1.0 - frac) + values[i + 1] * frac
    }

    fn wgrav(&self, s: f64) -> f64 {
        if s >= self.kernrange {
            return 1.0 / (s * s);
        }
        if s < self.ds {
            // Linear limit near the origin, M(s) ~ (4 pi / 3) W(0) s^3.
            return self.enclosed_mass[1] / (self.ds * self.ds * self.ds) * s;
        }
        self.lookup(&self.enclosed_mass, s) / (s * s)
    }

    fn wpot(&self, s: f64) -> f64 {
        if s >= self.kernrange {
            return 1.0 / s;
        }
        let near = self.lookup(&self.pot_tail, s);
        if s < self.ds {
            return near;
        }
        self.lookup(&self.enclosed_mass, s) / s + near
    }
}

fn m4_wgrav(s: f64) -> f64 {
    if s < 1.0 {
        4.0 / 3.0 * s - 1.2 * s.powi(3) + 0.5 * s.powi(4)
    } else if s < 2.0 {
        8.0 / 3.0 * s - 3.0 * s * s + 1.2 * s.powi(3) - s.powi(4) / 6.0 - 1.0 / (15.0 * s * s)
    } else {
        1.0 / (s * s)
    }
}

fn m4_wpot(s: f64) -> f64 {
    if s < 1.0 {
        1.4 - 2.0 / 3.0 * s * s + 0.3 * s.powi(4) - 0.1 * s.powi(5)
    } else if s < 2.0 {
        1.6 - 4.0 / 3.0 * s * s + s.powi(3) - 0.3 * s.powi(4) + s.powi(5) / 30.0
            - 1.0 / (15.0 * s)
    } else {
        1.0 / s
    }
}

impl Kernel {
    pub fn new(kind: KernelKind, ndim: usize, tabulated: bool) -> Self {
        let grav = match kind {
            KernelKind::M4 => None,
            _ => Some(GravTable::new(kind)),
        };
        let mut kernel = Self {
            kind,
            ndim,
            norm: norm_for(kind, ndim),
            kernrange: range_for(kind),
            grav,
            table: None,
        };
        if tabulated {
            kernel.table = Some(TabulatedKernel::new(&kernel));
        }
        kernel
    }

    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn kernrange(&self) -> f64 {
        self.kernrange
    }

    /// W(s) including the dimension normalization; divide by h^ndim.
    pub fn w0(&self, s: f64) -> f64 {
        if let Some(table) = &self.table {
            return table.w0(s);
        }
        self.w0_analytic(s)
    }

    /// dW/ds; divide by h^(ndim+1) for the spatial gradient magnitude.
    pub fn w1(&self, s: f64) -> f64 {
        if let Some(table) = &self.table {
            return table.w1(s);
        }
        self.w1_analytic(s)
    }

    /// The dW/dh combination, -ndim W(s) - s W'(s); divide by h^(ndim+1).
    pub fn womega(&self, s: f64) -> f64 {
        if let Some(table) = &self.table {
            return table.womega(s);
        }
        self.womega_analytic(s)
    }

    /// Softened gravitational force factor; multiply by m/h^2 along the
    /// unit separation vector.
    pub fn wgrav(&self, s: f64) -> f64 {
        if let Some(table) = &self.table {
            return table.wgrav(s);
        }
        self.wgrav_analytic(s)
    }

    /// Softened potential (positive convention); multiply by m/h.
    pub fn wpot(&self, s: f64) -> f64 {
        if let Some(table) = &self.table {
            return table.wpot(s);
        }
        self.wpot_analytic(s)
    }

    /// d(potential)/dh combination entering the grad-h gravity correction.
    pub fn wzeta(&self, s: f64) -> f64 {
        self.wpot(s) - s * self.wgrav(s)
    }

    pub(crate) fn w0_analytic(&self, s: f64) -> f64 {
        self.norm * w0_shape(self.kind, s)
    }

    pub(crate) fn w1_analytic(&self, s: f64) -> f64 {
        self.norm * w1_shape(self.kind, s)
    }

    pub(crate) fn womega_analytic(&self, s: f64) -> f64 {
        -(self.ndim as f64) * self.w0_analytic(s) - s * self.w1_analytic(s)
    }

    pub(crate) fn wgrav_analytic(&self, s: f64) -> f64 {
        match &self.grav {
            None => m4_wgrav(s),
            Some(table) => table.wgrav(s),
        }
    }

    pub(crate) fn wpot_analytic(&self, s: f64) -> f64 {
        match &self.grav {
            None => m4_wpot(s),
            Some(table) => table.wpot(s),
        }
    }

    /// W(|dr|, h), the full kernel value.
    pub fn w(&self, drmag: f64, h: f64) -> f64 {
        self.w0(drmag / h) / h.powi(self.ndim as i32)
    }

    /// Scalar dW/dr at separation |dr| for smoothing length h.
    pub fn grad_w(&self, drmag: f64, h: f64) -> f64 {
        self.w1(drmag / h) / h.powi(self.ndim as i32 + 1)
    }
}
