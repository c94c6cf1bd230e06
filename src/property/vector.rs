use std::fmt;
use std::ops::{Add, Sub};

/// A `Shape2D#Vector2D` point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vector2D(pub i32, pub i32);

impl Vector2D {
    pub fn new(x: i32, y: i32) -> Vector2D {
        Vector2D(x, y)
    }
    pub fn x(&self) -> i32 {
        self.0
    }
    pub fn y(&self) -> i32 {
        self.1
    }
}

impl fmt::Display for Vector2D {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

impl Add for Vector2D {
    type Output = Vector2D;

    fn add(self, other: Vector2D) -> Vector2D {
        Vector2D(self.0 + other.0, self.1 + other.1)
    }
}

impl Sub for Vector2D {
    type Output = Vector2D;

    fn sub(self, other: Vector2D) -> Vector2D {
        Vector2D(self.0 - other.0, self.1 - other.1)
    }
}
