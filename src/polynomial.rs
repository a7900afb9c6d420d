//! Shifted Legendre polynomials on an interval [a, b] and their
//! antiderivatives, the basis of the moment-fitting equations.


/// Legendre polynomial of degree `order` at `x` in [-1, 1].
fn p_n(x: f64, order: usize) -> f64 {
    match order {
        0 => 1.0,
        1 => x,
        2 => 0.5 * (3.0 * x.powi(2) - 1.0),
        3 => 0.5 * (5.0 * x.powi(3) - 3.0 * x),
        4 => 0.125 * (35.0 * x.powi(4) - 30.0 * x.powi(2) + 3.0),
        5 => 0.125 * (63.0 * x.powi(5) - 70.0 * x.powi(3) + 15.0 * x),
        6 => (231.0 * x.powi(6) - 315.0 * x.powi(4) + 105.0 * x.powi(2) - 5.0) / 16.0,
        7 => (429.0 * x.powi(7) - 693.0 * x.powi(5) + 315.0 * x.powi(3) - 35.0 * x) / 16.0,
        8 => {
            (6435.0 * x.powi(8) - 12012.0 * x.powi(6) + 6930.0 * x.powi(4) - 1260.0 * x.powi(2)
                + 35.0)
                / 128.0
        }
        _ => unreachable!("polynomial order out of range"),
    }
}

/// Shifted Legendre polynomial of degree `order` on [a, b].
pub fn f_x(x: f64, order: usize, a: f64, b: f64) -> f64 {
    let t = (2.0 * x - a - b) / (b - a);
    p_n(t, order)
}

/// Antiderivative of `f_x` with respect to `x`.
pub fn f_x_int(x: f64, order: usize, a: f64, b: f64) -> f64 {
    let s = a + b - 2.0 * x;
    let d = a - b;
    match order {
        0 => x,
        1 => -s.powi(2) / (4.0 * d),
        2 => -x / 2.0 - s.powi(3) / (4.0 * d.powi(2)),
        3 => 3.0 * s.powi(2) / (8.0 * d) - 5.0 * s.powi(4) / (16.0 * d.powi(3)),
        4 => {
            3.0 * x / 8.0 + 5.0 * s.powi(3) / (8.0 * d.powi(2))
                - 7.0 * s.powi(5) / (16.0 * d.powi(4))
        }
        5 => {
            35.0 * s.powi(4) / (32.0 * d.powi(3))
                - 15.0 * s.powi(2) / (32.0 * d)
                - 21.0 * s.powi(6) / (32.0 * d.powi(5))
        }
        6 => {
            63.0 * s.powi(5) / (32.0 * d.powi(4)) - 35.0 * s.powi(3) / (32.0 * d.powi(2))
                - 5.0 * x / 16.0
                - 33.0 * s.powi(7) / (32.0 * d.powi(6))
        }
        7 => {
            35.0 * s.powi(2) / (64.0 * d) - 315.0 * s.powi(4) / (128.0 * d.powi(3))
                + 231.0 * s.powi(6) / (64.0 * d.powi(5))
                - 429.0 * s.powi(8) / (256.0 * d.powi(7))
        }
        8 => {
            35.0 * x / 128.0 + 105.0 * s.powi(3) / (64.0 * d.powi(2))
                - 693.0 * s.powi(5) / (128.0 * d.powi(4))
                + 429.0 * s.powi(7) / (64.0 * d.powi(6))
                - 715.0 * s.powi(9) / (256.0 * d.powi(8))
        }
        _ => unreachable!("polynomial order out of range"),
    }
}
