// Site geometry domain model and polar stereographic projection
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_4;
use std::fmt;
use std::str::FromStr;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_INV_F: f64 = 298.257_223_563;

/// Geographic coordinate in degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Projected coordinate in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn around(center: Xy, radius: f64) -> Self {
        Self {
            min_x: center.x - radius,
            min_y: center.y - radius,
            max_x: center.x + radius,
            max_y: center.y + radius,
        }
    }

    pub fn expand(self, by: f64) -> Self {
        Self {
            min_x: self.min_x - by,
            min_y: self.min_y - by,
            max_x: self.max_x + by,
            max_y: self.max_y + by,
        }
    }

    pub fn contains(&self, p: Xy) -> bool {
        (self.min_x..=self.max_x).contains(&p.x) && (self.min_y..=self.max_y).contains(&p.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeometryKind {
    Point,
    Polygon,
}

/// Site geometry in geographic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(LatLon),
    /// Exterior ring, open or closed.
    Polygon(Vec<LatLon>),
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::Polygon(_) => GeometryKind::Polygon,
        }
    }

    /// Planar centroid in lon/lat space.
    pub fn centroid(&self) -> LatLon {
        match self {
            Geometry::Point(p) => *p,
            Geometry::Polygon(ring) => {
                let pts: Vec<(f64, f64)> = ring.iter().map(|p| (p.lon, p.lat)).collect();
                let (lon, lat) = ring_centroid(&pts);
                LatLon::new(lat, lon)
            }
        }
    }

    pub fn project(&self, crs: Crs) -> ProjectedGeometry {
        match self {
            Geometry::Point(p) => ProjectedGeometry::Point(crs.project(*p)),
            Geometry::Polygon(ring) => {
                ProjectedGeometry::Polygon(ring.iter().map(|p| crs.project(*p)).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedGeometry {
    Point(Xy),
    Polygon(Vec<Xy>),
}

impl ProjectedGeometry {
    pub fn centroid(&self) -> Xy {
        match self {
            ProjectedGeometry::Point(p) => *p,
            ProjectedGeometry::Polygon(ring) => {
                let pts: Vec<(f64, f64)> = ring.iter().map(|p| (p.x, p.y)).collect();
                let (x, y) = ring_centroid(&pts);
                Xy { x, y }
            }
        }
    }

    pub fn bounds(&self) -> Bounds {
        match self {
            ProjectedGeometry::Point(p) => Bounds::around(*p, 0.0),
            ProjectedGeometry::Polygon(ring) => ring.iter().fold(
                Bounds {
                    min_x: f64::INFINITY,
                    min_y: f64::INFINITY,
                    max_x: f64::NEG_INFINITY,
                    max_y: f64::NEG_INFINITY,
                },
                |b, p| Bounds {
                    min_x: b.min_x.min(p.x),
                    min_y: b.min_y.min(p.y),
                    max_x: b.max_x.max(p.x),
                    max_y: b.max_y.max(p.y),
                },
            ),
        }
    }

    /// Area covered by the geometry once buffered, or `None` for an
    /// unbuffered point (single-pixel sampling).
    pub fn sampling_area(&self, buffer: f64) -> Option<Bounds> {
        match self {
            ProjectedGeometry::Point(p) if buffer > 0.0 => Some(Bounds::around(*p, buffer)),
            ProjectedGeometry::Point(_) => None,
            ProjectedGeometry::Polygon(_) if buffer > 0.0 => Some(self.bounds().expand(buffer)),
            ProjectedGeometry::Polygon(_) => Some(self.bounds()),
        }
    }
}

/// Area-weighted centroid of a ring, falling back to the vertex mean when
/// the ring has no area.
fn ring_centroid(pts: &[(f64, f64)]) -> (f64, f64) {
    let mut pts = pts.to_vec();
    if pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }
    if pts.is_empty() {
        return (f64::NAN, f64::NAN);
    }

    // Shift to the first vertex to keep the shoelace sums well conditioned
    // for projected coordinates in the millions of metres.
    let (ox, oy) = pts[0];
    let mut area2 = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..pts.len() {
        let (x0, y0) = (pts[i].0 - ox, pts[i].1 - oy);
        let j = (i + 1) % pts.len();
        let (x1, y1) = (pts[j].0 - ox, pts[j].1 - oy);
        let cross = x0 * y1 - x1 * y0;
        area2 += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }

    if area2.abs() < f64::EPSILON {
        let n = pts.len() as f64;
        let sx: f64 = pts.iter().map(|p| p.0).sum();
        let sy: f64 = pts.iter().map(|p| p.1).sum();
        return (sx / n, sy / n);
    }

    (ox + cx / (3.0 * area2), oy + cy / (3.0 * area2))
}

/// Projected reference systems the archives are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// NSIDC Sea Ice Polar Stereographic North
    Epsg3413,
    /// Antarctic Polar Stereographic
    Epsg3031,
}

impl Crs {
    /// (latitude of true scale, central meridian) in degrees
    fn parameters(&self) -> (f64, f64) {
        match self {
            Crs::Epsg3413 => (70.0, -45.0),
            Crs::Epsg3031 => (-71.0, 0.0),
        }
    }

    /// Forward ellipsoidal polar stereographic projection (variant B).
    pub fn project(&self, p: LatLon) -> Xy {
        let (lat_ts, lon_0) = self.parameters();
        let south = lat_ts < 0.0;
        let sign = if south { -1.0 } else { 1.0 };

        let f = 1.0 / WGS84_INV_F;
        let e = (f * (2.0 - f)).sqrt();

        let t = |phi: f64| {
            let es = e * phi.sin();
            (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
        };
        let m = |phi: f64| {
            let es = e * phi.sin();
            phi.cos() / (1.0 - es * es).sqrt()
        };

        let phi = (sign * p.lat).to_radians();
        let phi_c = (sign * lat_ts).to_radians();
        let lam = (p.lon - lon_0).to_radians();

        let rho = WGS84_A * m(phi_c) * t(phi) / t(phi_c);
        Xy {
            x: rho * lam.sin(),
            y: -sign * rho * lam.cos(),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Crs::Epsg3413 => "EPSG:3413",
            Crs::Epsg3031 => "EPSG:3031",
        };
        write!(f, "{}", code)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported CRS: {0}")]
pub struct CrsParseError(String);

impl FromStr for Crs {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EPSG:3413" => Ok(Crs::Epsg3413),
            "EPSG:3031" => Ok(Crs::Epsg3031),
            _ => Err(CrsParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Crs {
    type Error = CrsParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

/// A location to extract a time series for.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub name: String,
    pub geometry: Geometry,
    /// Buffer distance in metres; <= 0 means no buffering.
    pub buffer: f64,
}
