use crate::common::*;

/// Bounding box in corner format `(x1, y1, x2, y2)`.
///
/// The corners are pixel indexes. Width and height are measured the VOC way,
/// counting both corner pixels, so a box with `x1 == x2` is one pixel wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XYXY<T> {
    pub(crate) x1: T,
    pub(crate) y1: T,
    pub(crate) x2: T,
    pub(crate) y2: T,
}

impl<T> XYXY<T> {
    pub fn try_cast<V>(self) -> Option<XYXY<V>>
    where
        T: ToPrimitive,
        V: NumCast,
    {
        Some(XYXY {
            x1: V::from(self.x1)?,
            y1: V::from(self.y1)?,
            x2: V::from(self.x2)?,
            y2: V::from(self.y2)?,
        })
    }
}

impl<T> XYXY<T>
where
    T: Copy + Num + PartialOrd,
{
    pub fn try_from_xyxy(xyxy: [T; 4]) -> Result<Self> {
        let [x1, y1, x2, y2] = xyxy;
        ensure!(x2 >= x1 && y2 >= y1, "x2 >= x1 and y2 >= y1 must hold");
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn xyxy(&self) -> [T; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn x1(&self) -> T {
        self.x1
    }

    pub fn y1(&self) -> T {
        self.y1
    }

    pub fn x2(&self) -> T {
        self.x2
    }

    pub fn y2(&self) -> T {
        self.y2
    }

    /// Width including both border pixels.
    pub fn w(&self) -> T {
        self.x2 - self.x1 + T::one()
    }

    /// Height including both border pixels.
    pub fn h(&self) -> T {
        self.y2 - self.y1 + T::one()
    }

    pub fn area(&self) -> T {
        self.w() * self.h()
    }

    pub fn center(&self) -> [T; 2] {
        let two = T::one() + T::one();
        [(self.x1 + self.x2) / two, (self.y1 + self.y2) / two]
    }

    /// Translate every corner by `offset`.
    ///
    /// Used to move between 0-based and 1-based pixel indexes.
    pub fn shift(&self, offset: T) -> Self {
        Self {
            x1: self.x1 + offset,
            y1: self.y1 + offset,
            x2: self.x2 + offset,
            y2: self.y2 + offset,
        }
    }

    /// Raise every corner to at least `min`.
    ///
    /// The corner ordering is preserved.
    pub fn clamp_min(&self, min: T) -> Self {
        let clamp = |value: T| if value < min { min } else { value };
        Self {
            x1: clamp(self.x1),
            y1: clamp(self.y1),
            x2: clamp(self.x2),
            y2: clamp(self.y2),
        }
    }
}

impl<T> XYXY<T>
where
    T: Float,
{
    /// Intersection area with both border pixels counted, zero if disjoint.
    pub fn intersection_area(&self, other: &Self) -> T {
        let zero = T::zero();
        let iw = self.x2.min(other.x2) - self.x1.max(other.x1) + T::one();
        let ih = self.y2.min(other.y2) - self.y1.max(other.y1) + T::one();

        if iw > zero && ih > zero {
            iw * ih
        } else {
            zero
        }
    }

    pub fn iou_with(&self, other: &Self) -> T {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union > T::zero() {
            inter / union
        } else {
            T::zero()
        }
    }
}
