use shared::{HeldInput, DIAGONAL_FACTOR, HIT_INSET};

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, matching screen coordinates.
    pub y: f32,
}

impl Vector2 {
    pub fn new(x: f32, y: f32) -> Self {
        Vector2 { x, y }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Displacement for one tick of held input.
    ///Both axes are scaled by the diagonal factor when two axes are held.
    pub fn from_input(input: &HeldInput, speed: f32, dt: f32) -> Vector2 {
        let (dx, dy) = input.direction();
        let factor = if dx != 0.0 && dy != 0.0 {
            DIAGONAL_FACTOR
        } else {
            1.0
        };
        Vector2::new(dx, dy).scale(speed * factor * dt)
    }
}

///Axis-aligned box. Position is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn square(x: f32, y: f32, size: f32) -> Self {
        Rect::new(x, y, size, size)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Vector2 {
        Vector2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn translate(&self, offset: Vector2) -> Rect {
        Rect::new(self.x + offset.x, self.y + offset.y, self.width, self.height)
    }

    ///Smallest box containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    ///Strict AABB intersection. Touching edges do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        !(self.right() <= other.x
            || self.x >= other.right()
            || self.bottom() <= other.y
            || self.y >= other.bottom())
    }

    ///Lenient hit test used for flames and power-ups: the body has to
    ///reach `HIT_INSET` pixels into the other box on every side.
    pub fn hits(&self, other: &Rect) -> bool {
        !(self.right() - HIT_INSET < other.x
            || self.x + HIT_INSET > other.right()
            || self.bottom() - HIT_INSET < other.y
            || self.y + HIT_INSET > other.bottom())
    }

    ///Keeps the box inside `[0, width] x [0, height]`.
    pub fn clamp_within(&self, width: f32, height: f32) -> Rect {
        Rect::new(
            self.x.clamp(0.0, (width - self.width).max(0.0)),
            self.y.clamp(0.0, (height - self.height).max(0.0)),
            self.width,
            self.height,
        )
    }
}

///Moves `body` by `offset` one axis at a time, stopping flush against any
///blocker it would enter.
///
///Blockers the body already overlaps before moving are ignored, so a body
///standing inside something (a bomb it just dropped) can walk out of it
///instead of being snapped to an edge.
pub fn slide(body: Rect, offset: Vector2, blockers: &[Rect]) -> Rect {
    let active: Vec<&Rect> = blockers.iter().filter(|b| !body.overlaps(b)).collect();

    let mut moved = body;
    if offset.x != 0.0 {
        moved.x += offset.x;
        for blocker in &active {
            if moved.overlaps(blocker) {
                if offset.x > 0.0 {
                    moved.x = moved.x.min(blocker.x - moved.width);
                } else {
                    moved.x = moved.x.max(blocker.right());
                }
            }
        }
    }

    if offset.y != 0.0 {
        moved.y += offset.y;
        for blocker in &active {
            if moved.overlaps(blocker) {
                if offset.y > 0.0 {
                    moved.y = moved.y.min(blocker.y - moved.height);
                } else {
                    moved.y = moved.y.max(blocker.bottom());
                }
            }
        }
    }

    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vector_operations() {
        let v = Vector2::new(3.0, 4.0);
        assert_eq!(v.scale(2.0), Vector2::new(6.0, 8.0));
        assert_eq!(v.scale(0.0), Vector2::new(0.0, 0.0));
    }

    #[test]
    fn test_diagonal_displacement_matches_axis() {
        let axis = Vector2::from_input(
            &HeldInput {
                right: true,
                ..Default::default()
            },
            150.0,
            0.05,
        );
        let diagonal = Vector2::from_input(
            &HeldInput {
                right: true,
                down: true,
                ..Default::default()
            },
            150.0,
            0.05,
        );
        assert_approx_eq!(diagonal.x.hypot(diagonal.y), axis.x.hypot(axis.y), 0.01);
        assert_approx_eq!(diagonal.x, axis.x * DIAGONAL_FACTOR, 0.0001);
    }

    #[test]
    fn test_overlap_excludes_touching() {
        let a = Rect::square(0.0, 0.0, 50.0);
        assert!(!a.overlaps(&Rect::square(50.0, 0.0, 50.0)));
        assert!(a.overlaps(&Rect::square(49.0, 49.0, 50.0)));
    }

    #[test]
    fn test_hit_requires_inset() {
        let player = Rect::square(0.0, 0.0, 40.0);
        // 5px of overlap is not enough
        assert!(!player.hits(&Rect::square(35.0, 0.0, 50.0)));
        assert!(player.hits(&Rect::square(25.0, 0.0, 50.0)));
    }

    #[test]
    fn test_slide_stops_flush() {
        let body = Rect::square(0.0, 5.0, 40.0);
        let wall = Rect::square(50.0, 0.0, 50.0);
        let moved = slide(body, Vector2::new(20.0, 0.0), &[wall]);
        assert_eq!(moved.x, 10.0);
        assert!(!moved.overlaps(&wall));
    }

    #[test]
    fn test_slide_keeps_free_axis() {
        let body = Rect::square(0.0, 5.0, 40.0);
        let wall = Rect::square(50.0, 0.0, 50.0);
        let moved = slide(body, Vector2::new(20.0, 3.0), &[wall]);
        assert_eq!(moved.x, 10.0);
        assert_eq!(moved.y, 8.0);
    }

    #[test]
    fn test_slide_ignores_already_overlapping() {
        let body = Rect::square(5.0, 5.0, 40.0);
        let bomb = Rect::square(0.0, 0.0, 50.0);
        let moved = slide(body, Vector2::new(-3.0, 0.0), &[bomb]);
        assert_eq!(moved.x, 2.0);
    }

    #[test]
    fn test_union_covers_sweep() {
        let start = Rect::square(10.0, 10.0, 40.0);
        let end = start.translate(Vector2::new(-5.0, 8.0));
        let swept = start.union(&end);
        assert_eq!(swept, Rect::new(5.0, 10.0, 45.0, 48.0));
    }

    #[test]
    fn test_clamp_within() {
        let body = Rect::square(640.0, -4.0, 40.0);
        let clamped = body.clamp_within(650.0, 550.0);
        assert_eq!(clamped.x, 610.0);
        assert_eq!(clamped.y, 0.0);
    }
}
