use crate::{
    common::*,
    unit::{GridUnit, PixelUnit, RatioUnit, Unit},
};
use num_traits::{Num, NumCast, ToPrimitive};

/// A height/width pair tagged with its coordinate system unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TensorLike)]
pub struct Size<T, U>
where
    U: Unit,
{
    pub h: T,
    pub w: T,
    #[serde(skip)]
    #[tensor_like(copy)]
    _phantom: PhantomData<U>,
}

impl<T, U> Size<T, U>
where
    U: Unit,
{
    pub fn from_hw(h: T, w: T) -> Result<Self>
    where
        T: Num + PartialOrd,
    {
        let zero = T::zero();
        ensure!(
            h >= zero && w >= zero,
            "the height and width must be non-negative"
        );
        Ok(Self {
            h,
            w,
            _phantom: PhantomData,
        })
    }

    pub fn cast<S>(&self) -> Option<Size<S, U>>
    where
        T: Copy + ToPrimitive,
        S: NumCast,
    {
        Some(Size {
            h: <S as NumCast>::from(self.h)?,
            w: <S as NumCast>::from(self.w)?,
            _phantom: PhantomData,
        })
    }
}

pub type PixelSize<T> = Size<T, PixelUnit>;
pub type GridSize<T> = Size<T, GridUnit>;
pub type RatioSize<T> = Size<T, RatioUnit>;
