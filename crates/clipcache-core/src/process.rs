//! Per-pixel processing over buffer and constant inputs.
//!
//! Processing is pull based: for every output pixel each input is sampled at
//! the same center-relative position, converted to the layout the operation
//! asked for, and handed to the operation together with the output slot.

use crate::buffer::{sample_or, Buffer, ChannelLayout, Pixel};
use crate::coerce::convert_pixel;
use smallvec::SmallVec;
use std::borrow::Cow;

/// One input of [`process_pixels`].
pub struct ProcessInput<'a> {
    /// Image input. `None` means the input carries only `constant`.
    pub buffer: Option<&'a Buffer>,
    /// Value used when there is no buffer.
    pub constant: Pixel,
    /// Layout the operation expects for this input.
    pub layout: ChannelLayout,
}

impl<'a> ProcessInput<'a> {
    pub fn buffer(buffer: &'a Buffer, layout: ChannelLayout) -> Self {
        Self {
            buffer: Some(buffer),
            constant: Pixel::from_elem(0.0, layout.channels()),
            layout,
        }
    }

    pub fn constant(value: &[f32], layout: ChannelLayout) -> Self {
        let mut constant = Pixel::from_elem(0.0, layout.channels());
        convert_pixel(value, &mut constant);
        Self {
            buffer: None,
            constant,
            layout,
        }
    }

    /// Input that uses `buffer` when present and `value` otherwise.
    pub fn socket(buffer: Option<&'a Buffer>, value: &[f32], layout: ChannelLayout) -> Self {
        Self {
            buffer,
            ..Self::constant(value, layout)
        }
    }
}

/// Run `op` for every pixel of a new `width` x `height` buffer.
///
/// `op` receives the output sample tuple and the input tuples in the order
/// given.
pub fn process_pixels<F>(
    layout: ChannelLayout,
    width: u32,
    height: u32,
    inputs: &[ProcessInput<'_>],
    mut op: F,
) -> Buffer
where
    F: FnMut(&mut [f32], &[Pixel]),
{
    let coerced: SmallVec<[Option<Cow<'_, Buffer>>; 4]> = inputs
        .iter()
        .map(|input| input.buffer.map(|b| b.coerce(input.layout)))
        .collect();

    let mut out = Buffer::allocate(width, height, layout, false);
    let n = layout.channels();
    let xrad = (width / 2) as i32;
    let yrad = (height / 2) as i32;
    let mut pixels: SmallVec<[Pixel; 4]> = SmallVec::with_capacity(inputs.len());

    if let Some(samples) = out.samples_mut() {
        for (i, px) in samples.chunks_exact_mut(n).enumerate() {
            let x = (i % width as usize) as i32 - xrad;
            let y = (i / width as usize) as i32 - yrad;

            pixels.clear();
            for (input, buffer) in inputs.iter().zip(&coerced) {
                let mut value = sample_or(buffer.as_deref(), &input.constant, x, y);
                // Procedural inputs are not coerced up front.
                if value.len() != input.layout.channels() {
                    let mut converted = Pixel::from_elem(0.0, input.layout.channels());
                    convert_pixel(&value, &mut converted);
                    value = converted;
                }
                pixels.push(value);
            }
            op(px, &pixels);
        }
    }
    out
}
