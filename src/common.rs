pub use anyhow::{bail, ensure, format_err, Error, Result};
pub use approx::{abs_diff_eq, AbsDiffEq};
pub use getset::Getters;
pub use itertools::{izip, Itertools};
pub use log::warn;
pub use noisy_float::prelude::*;
pub use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
pub use std::{
    convert::{TryFrom, TryInto},
    marker::PhantomData,
};
pub use tch::{Device, IndexOp, Kind, Tensor};
pub use tch_tensor_like::TensorLike;

unzip_n::unzip_n!(pub 2);
