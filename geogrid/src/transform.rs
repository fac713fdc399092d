use crate::GridError;
use geo::geometry::Coord;

/// Affine map from pixel space `(col, row)` to CRS coordinates.
///
/// Parameter order follows the GDAL convention:
///
/// ```text
/// x = x0 + col * dx + row * rx
/// y = y0 + col * ry + row * dy
/// ```
///
/// `(col, row)` addresses pixel corners; the center of pixel `(c, r)`
/// is at `(c + 0.5, r + 0.5)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub x0: f64,
    pub dx: f64,
    pub rx: f64,
    pub y0: f64,
    pub ry: f64,
    pub dy: f64,
}

impl GeoTransform {
    /// Returns a rotation free transform with `origin` as the
    /// top-left corner.
    ///
    /// `pixel_height` is given as a positive distance; rows grow
    /// southward.
    pub fn north_up(origin: Coord, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            x0: origin.x,
            dx: pixel_width,
            rx: 0.0,
            y0: origin.y,
            ry: 0.0,
            dy: -pixel_height,
        }
    }

    pub fn from_gdal([x0, dx, rx, y0, ry, dy]: [f64; 6]) -> Self {
        Self {
            x0,
            dx,
            rx,
            y0,
            ry,
            dy,
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [self.x0, self.dx, self.rx, self.y0, self.ry, self.dy]
    }

    pub fn is_north_up(&self) -> bool {
        self.rx == 0.0 && self.ry == 0.0 && self.dy < 0.0
    }

    pub fn has_rotation(&self) -> bool {
        self.rx != 0.0 || self.ry != 0.0
    }

    /// Pixel width in CRS units.
    pub fn pixel_width(&self) -> f64 {
        self.dx.hypot(self.ry)
    }

    /// Pixel height in CRS units.
    pub fn pixel_height(&self) -> f64 {
        self.rx.hypot(self.dy)
    }

    pub fn apply(&self, col: f64, row: f64) -> Coord {
        Coord {
            x: self.x0 + col * self.dx + row * self.rx,
            y: self.y0 + col * self.ry + row * self.dy,
        }
    }

    pub fn pixel_center(&self, col: usize, row: usize) -> Coord {
        #[allow(clippy::cast_precision_loss)]
        let (col, row) = (col as f64 + 0.5, row as f64 + 0.5);
        self.apply(col, row)
    }

    /// Returns the map from CRS coordinates back to pixel space.
    pub fn inverse(&self) -> Result<InverseTransform, GridError> {
        let det = self.dx * self.dy - self.rx * self.ry;
        if det == 0.0 || !det.is_finite() {
            return Err(GridError::Singular);
        }
        Ok(InverseTransform {
            forward: *self,
            det,
        })
    }
}

/// CRS coordinates to fractional `(col, row)`.
#[derive(Debug, Clone, Copy)]
pub struct InverseTransform {
    forward: GeoTransform,
    det: f64,
}

impl InverseTransform {
    pub fn apply(&self, coord: Coord) -> (f64, f64) {
        let GeoTransform {
            x0,
            dx,
            rx,
            y0,
            ry,
            dy,
        } = self.forward;
        let x = coord.x - x0;
        let y = coord.y - y0;
        let col = (x * dy - y * rx) / self.det;
        let row = (y * dx - x * ry) / self.det;
        (col, row)
    }

    /// Returns the integer pixel containing `coord`, which may be
    /// outside of any particular grid.
    pub fn pixel(&self, coord: Coord) -> (isize, isize) {
        let (col, row) = self.apply(coord);
        #[allow(clippy::cast_possible_truncation)]
        let pixel = (col.floor() as isize, row.floor() as isize);
        pixel
    }
}

#[cfg(test)]
mod tests {
    use super::{Coord, GeoTransform};
    use approx::assert_relative_eq;

    #[test]
    fn test_north_up_round_trip() {
        let gt = GeoTransform::north_up(Coord { x: 1000.0, y: 5000.0 }, 10.0, 10.0);
        assert!(gt.is_north_up());
        let c = gt.pixel_center(3, 7);
        assert_eq!(c, Coord { x: 1035.0, y: 4925.0 });
        let inv = gt.inverse().unwrap();
        assert_eq!(inv.pixel(c), (3, 7));
        let (col, row) = inv.apply(c);
        assert_relative_eq!(col, 3.5);
        assert_relative_eq!(row, 7.5);
    }

    #[test]
    fn test_rotated_round_trip() {
        let gt = GeoTransform::from_gdal([500.0, 8.0, 6.0, 900.0, 6.0, -8.0]);
        assert!(gt.has_rotation());
        assert_relative_eq!(gt.pixel_width(), 10.0);
        assert_relative_eq!(gt.pixel_height(), 10.0);
        let inv = gt.inverse().unwrap();
        let (col, row) = inv.apply(gt.apply(12.25, 4.5));
        assert_relative_eq!(col, 12.25, epsilon = 1e-9);
        assert_relative_eq!(row, 4.5, epsilon = 1e-9);
    }

    #[test]
    fn test_singular() {
        let gt = GeoTransform::from_gdal([0.0, 0.0, 0.0, 0.0, 0.0, -1.0]);
        assert!(gt.inverse().is_err());
    }
}
