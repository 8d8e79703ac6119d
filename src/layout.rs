//! Geometry used for input synthesis and element screenshots.

use chromiumoxide_cdp::cdp::browser_protocol::dom::Quad;
use chromiumoxide_cdp::cdp::browser_protocol::page::Viewport;

/// A position in viewport CSS pixels
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The point `fraction` of the way towards `other`
    pub fn lerp(&self, other: &Point, fraction: f64) -> Point {
        Point {
            x: self.x + (other.x - self.x) * fraction,
            y: self.y + (other.y - self.y) * fraction,
        }
    }

    fn area(&self, other: &Self) -> f64 {
        (self.x * other.y - other.x * self.y) / 2.
    }
}

impl std::ops::Add<Point> for Point {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl std::ops::Sub<Point> for Point {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

/// A wheel scroll distance in CSS pixels
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Delta {
    pub delta_x: f64,
    pub delta_y: f64,
}

impl Delta {
    pub fn new(delta_x: f64, delta_y: f64) -> Self {
        Self { delta_x, delta_y }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ScrollBehavior {
    #[default]
    Auto,
    Instant,
    Smooth,
}

impl AsRef<str> for ScrollBehavior {
    fn as_ref(&self) -> &str {
        match self {
            ScrollBehavior::Auto => "auto",
            ScrollBehavior::Instant => "instant",
            ScrollBehavior::Smooth => "smooth",
        }
    }
}

/// The four corners of a content/padding/border/margin box as reported by
/// `DOM.getBoxModel` and `DOM.getContentQuads`
#[derive(Debug, Copy, Clone)]
pub struct ElementQuad {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl ElementQuad {
    pub fn from_quad(quad: &Quad) -> Self {
        assert_eq!(quad.inner().len(), 8);
        let raw_quad = quad.inner();
        Self {
            top_left: Point {
                x: raw_quad[0],
                y: raw_quad[1],
            },
            top_right: Point {
                x: raw_quad[2],
                y: raw_quad[3],
            },
            bottom_right: Point {
                x: raw_quad[4],
                y: raw_quad[5],
            },
            bottom_left: Point {
                x: raw_quad[6],
                y: raw_quad[7],
            },
        }
    }

    pub fn quad_center(&self) -> Point {
        Point {
            x: (self.top_left.x + self.top_right.x + self.bottom_right.x + self.bottom_left.x) / 4.,
            y: (self.top_left.y + self.top_right.y + self.bottom_right.y + self.bottom_left.y) / 4.,
        }
    }

    /// Compute sum of all directed areas of adjacent triangles
    /// https://en.wikipedia.org/wiki/Polygon#Simple_polygons
    pub fn quad_area(&self) -> f64 {
        let area = self.top_left.area(&self.top_right)
            + self.top_right.area(&self.bottom_right)
            + self.bottom_right.area(&self.bottom_left)
            + self.bottom_left.area(&self.top_left);
        area.abs()
    }

    pub fn height(&self) -> f64 {
        self.bottom_left.y - self.top_left.y
    }

    pub fn width(&self) -> f64 {
        self.top_right.x - self.top_left.x
    }

    /// The most left (smallest) x-coordinate
    pub fn most_left(&self) -> f64 {
        self.top_right
            .x
            .min(self.top_left.x)
            .min(self.bottom_right.x)
            .min(self.bottom_left.x)
    }

    /// The most right (largest) x-coordinate
    pub fn most_right(&self) -> f64 {
        self.top_right
            .x
            .max(self.top_left.x)
            .max(self.bottom_right.x)
            .max(self.bottom_left.x)
    }

    /// The most top (smallest) y-coordinate
    pub fn most_top(&self) -> f64 {
        self.top_right
            .y
            .min(self.top_left.y)
            .min(self.bottom_right.y)
            .min(self.bottom_left.y)
    }

    /// The most bottom (largest) y-coordinate
    pub fn most_bottom(&self) -> f64 {
        self.top_right
            .y
            .max(self.top_left.y)
            .max(self.bottom_right.y)
            .max(self.bottom_left.y)
    }
}

#[derive(Debug, Clone)]
pub struct BoxModel {
    pub content: ElementQuad,
    pub padding: ElementQuad,
    pub border: ElementQuad,
    pub margin: ElementQuad,
    pub width: u32,
    pub height: u32,
}

impl BoxModel {
    /// Create a `Viewport` equal to the content-box, using a scale of 1.0
    pub fn content_viewport(&self) -> Viewport {
        Viewport {
            x: self.content.top_left.x,
            y: self.content.top_left.y,
            width: self.content.width(),
            height: self.content.height(),
            scale: 1.0,
        }
    }

    /// Create a `Viewport` equal to the border-box, using a scale of 1.0
    pub fn border_viewport(&self) -> Viewport {
        Viewport {
            x: self.border.top_left.x,
            y: self.border.top_left.y,
            width: self.border.width(),
            height: self.border.height(),
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoundingBox {
    /// the x coordinate of the element in pixels.
    pub x: f64,
    /// the y coordinate of the element in pixels.
    pub y: f64,
    /// the width of the element in pixels.
    pub width: f64,
    /// the height of the element in pixels.
    pub height: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_interpolates_between_points() {
        let a = Point::new(0., 0.);
        let b = Point::new(10., 20.);
        assert_eq!(a.lerp(&b, 0.5), Point::new(5., 10.));
        assert_eq!(a.lerp(&b, 1.0), b);
        assert_eq!(a.lerp(&b, 0.0), a);
    }
}
