//! Padding of spatial dimensions for convolution and pooling operators.

use std::fmt;
use std::ops::Index;

use smallvec::SmallVec;

use crate::dim::Dimension;
use crate::errors::{DimError, ShapeError};
use crate::shape::{ShapeKind, kind_of};

/// Placement of the odd element when "same" padding needs an odd total.
///
/// These correspond to the `SAME_UPPER` and `SAME_LOWER` values of the ONNX
/// `auto_pad` attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SamePad {
    /// Extra padding goes at the end.
    #[default]
    Upper,
    /// Extra padding goes at the start.
    Lower,
}

/// Padding added before and after one spatial dimension.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Padding {
    pub before: Dimension,
    pub after: Dimension,
}

impl Padding {
    pub fn new(before: impl Into<Dimension>, after: impl Into<Dimension>) -> Self {
        Padding {
            before: before.into(),
            after: after.into(),
        }
    }

    pub fn zero() -> Self {
        Padding::new(0, 0)
    }

    /// Return the combined padding `before + after`.
    pub fn total(&self) -> Dimension {
        &self.before + &self.after
    }

    pub fn is_fixed(&self) -> bool {
        self.before.is_fixed() && self.after.is_fixed()
    }

    /// Compute the padding which makes the output size of a convolution or
    /// pooling operator `ceil(input / stride)`.
    ///
    /// The total padding is
    /// `max(0, (out - 1) * stride + (kernel - 1) * dilation + 1 - input)`. It
    /// is split evenly, with any odd element placed according to `mode`.
    pub fn same(
        input: &Dimension,
        kernel: &Dimension,
        stride: usize,
        dilation: usize,
        mode: SamePad,
    ) -> Result<Padding, DimError> {
        let stride = Dimension::from(stride);
        let dilation = Dimension::from(dilation);

        let out = input.checked_div_ceil(&stride)?;
        let total = ((out - 1) * &stride + (kernel - 1) * &dilation + 1 - input).simplify()?;
        let total = Dimension::Fixed(0).max(&total);

        let two = Dimension::Fixed(2);
        let before = match mode {
            SamePad::Upper => total.checked_div(&two)?,
            SamePad::Lower => total.checked_div_ceil(&two)?,
        };
        let after = (&total - &before).simplify()?;

        Ok(Padding { before, after })
    }
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.before, self.after)
    }
}

/// Return the output size for a spatial dimension of a convolution or
/// pooling operator.
///
/// This is `(input + before + after - dilation * (kernel - 1) - 1) / stride + 1`,
/// as given in the ONNX docs for the `Conv` and `MaxPool` operators.
pub fn conv_output_size(
    input: &Dimension,
    kernel: &Dimension,
    stride: usize,
    dilation: usize,
    padding: &Padding,
) -> Result<Dimension, DimError> {
    let stride = Dimension::from(stride);
    let dilation = Dimension::from(dilation);

    let padded = input + padding.total();
    let span = dilation * (kernel - 1) + 1;
    let out = (padded - span).checked_div(&stride)? + 1;
    out.simplify()
}

/// Padding for every spatial dimension of an operator input.
///
/// Like [`RankedShape`](crate::RankedShape), the [`kind`](Paddings::kind) is
/// computed on construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Paddings {
    pads: SmallVec<[Padding; 4]>,
    kind: ShapeKind,
}

impl Paddings {
    pub fn new(pads: impl IntoIterator<Item = Padding>) -> Self {
        let pads: SmallVec<[Padding; 4]> = pads.into_iter().collect();
        let kind = kind_of(pads.iter().flat_map(|p| [&p.before, &p.after]));
        Paddings { pads, kind }
    }

    /// Return zero padding for `rank` spatial dimensions.
    pub fn zeros(rank: usize) -> Self {
        Paddings::new(std::iter::repeat_n(Padding::zero(), rank))
    }

    /// Create paddings from a flat list in the `[starts..., ends...]` layout
    /// used by the ONNX `pads` attribute.
    pub fn from_pads(pads: &[Dimension]) -> Result<Self, ShapeError> {
        if pads.len() % 2 != 0 {
            return Err(ShapeError::OddPadCount(pads.len()));
        }
        let (starts, ends) = pads.split_at(pads.len() / 2);
        Ok(Paddings::new(
            starts
                .iter()
                .zip(ends)
                .map(|(start, end)| Padding::new(start.clone(), end.clone())),
        ))
    }

    /// Compute "same" padding for each spatial dimension.
    ///
    /// See [`Padding::same`].
    pub fn same(
        input: &[Dimension],
        kernel: &[Dimension],
        strides: &[usize],
        dilations: &[usize],
        mode: SamePad,
    ) -> Result<Self, ShapeError> {
        let rank = input.len();
        if kernel.len() != rank || strides.len() != rank || dilations.len() != rank {
            return Err(ShapeError::RankMismatch {
                lhs: format!("{input:?}"),
                rhs: format!("{kernel:?}"),
            });
        }

        let pads = (0..rank)
            .map(|i| Padding::same(&input[i], &kernel[i], strides[i], dilations[i], mode))
            .collect::<Result<SmallVec<[Padding; 4]>, _>>()?;
        Ok(Paddings::new(pads))
    }

    /// Return the number of spatial dimensions.
    pub fn rank(&self) -> usize {
        self.pads.len()
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn is_fixed(&self) -> bool {
        self.kind == ShapeKind::Fixed
    }

    pub fn get(&self, index: usize) -> Option<&Padding> {
        self.pads.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Padding> {
        self.pads.iter()
    }

    /// Return the padding sizes in `[starts..., ends...]` layout.
    pub fn to_dims(&self) -> Vec<Dimension> {
        self.pads
            .iter()
            .map(|p| p.before.clone())
            .chain(self.pads.iter().map(|p| p.after.clone()))
            .collect()
    }

    /// Return the concrete padding sizes in `[starts..., ends...]` layout.
    ///
    /// Fails unless every padding is fixed.
    pub fn to_value_array(&self) -> Result<Vec<i64>, ShapeError> {
        self.to_dims()
            .iter()
            .map(|d| d.as_fixed().ok_or_else(|| ShapeError::NotFixed(self.to_string())))
            .collect()
    }
}

impl Index<usize> for Paddings {
    type Output = Padding;

    fn index(&self, index: usize) -> &Padding {
        &self.pads[index]
    }
}

impl FromIterator<Padding> for Paddings {
    fn from_iter<I: IntoIterator<Item = Padding>>(iter: I) -> Self {
        Paddings::new(iter)
    }
}

impl fmt::Display for Paddings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, pad) in self.pads.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{pad}")?;
        }
        write!(f, "]")
    }
}
