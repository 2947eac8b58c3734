//! Integration tests for buffer aliasing, coercion and processing.

use clipcache_core::{process_pixels, Buffer, ChannelLayout, ProcessInput};
use std::borrow::Cow;

// ── Helpers ────────────────────────────────────────────────────

fn gradient(layout: ChannelLayout) -> Buffer {
    let n = layout.channels();
    let samples = (0..4 * 3 * n).map(|i| i as f32 / 10.0).collect();
    Buffer::from_samples(4, 3, layout, samples).unwrap()
}

const LAYOUTS: [ChannelLayout; 4] = [
    ChannelLayout::Value,
    ChannelLayout::Vector2,
    ChannelLayout::Vector3,
    ChannelLayout::Rgba,
];

// ── Coercion ───────────────────────────────────────────────────

#[test]
fn coerce_twice_returns_first_result_unchanged() {
    for from in LAYOUTS {
        for to in LAYOUTS {
            let buffer = gradient(from);
            let once = buffer.coerce(to);
            let twice = once.coerce(to);
            assert!(matches!(twice, Cow::Borrowed(_)));
            assert!(twice.shares_storage(&once));
        }
    }
}

#[test]
fn coerce_to_own_layout_is_same_handle() {
    for layout in LAYOUTS {
        let buffer = gradient(layout);
        let owners = buffer.owner_count();
        let same = buffer.coerce(layout);
        assert!(matches!(same, Cow::Borrowed(b) if std::ptr::eq(b, &buffer)));
        assert_eq!(buffer.owner_count(), owners);
    }
}

#[test]
fn vector3_to_rgba_synthesizes_opaque_alpha() {
    let buffer = Buffer::filled(2, 2, ChannelLayout::Vector3, &[0.2, 0.4, 0.6]);
    let rgba = buffer.coerce(ChannelLayout::Rgba);
    for y in 0..2 {
        for x in 0..2 {
            assert_eq!(rgba.pixel(x, y).unwrap(), &[0.2, 0.4, 0.6, 1.0]);
        }
    }
}

#[test]
fn coerce_keeps_offset_and_crop() {
    let mut buffer = gradient(ChannelLayout::Rgba);
    buffer.set_offset(3, -2);
    let value = buffer.coerce(ChannelLayout::Value);
    assert_eq!(value.offset(), (3, -2));
    assert_eq!(value.layout(), ChannelLayout::Value);
}

// ── Aliasing and ownership ─────────────────────────────────────

#[test]
fn pass_on_aliases_and_release_keeps_data() {
    let buffer = gradient(ChannelLayout::Rgba);
    let alias = buffer.pass_on();
    assert!(alias.shares_storage(&buffer));
    assert_eq!(alias.samples().unwrap().as_ptr(), buffer.samples().unwrap().as_ptr());

    alias.release();
    assert_eq!(buffer.owner_count(), 1);
    assert_eq!(buffer.pixel(1, 0).unwrap()[0], 0.4);
}

#[test]
fn storage_freed_after_last_alias() {
    let buffer = gradient(ChannelLayout::Value);
    let identity = buffer.identity();
    let chain: Vec<Buffer> = (0..5).map(|_| buffer.pass_on()).collect();
    assert_eq!(buffer.owner_count(), 6);

    buffer.release();
    assert!(!identity.is_released());
    for (i, alias) in chain.into_iter().enumerate() {
        assert_eq!(alias.owner_count(), 5 - i);
        alias.release();
    }
    assert!(identity.is_released());
}

#[test]
fn writing_through_alias_detaches_it() {
    let buffer = gradient(ChannelLayout::Value);
    let mut alias = buffer.pass_on();
    alias.pixel_mut(0, 0).unwrap()[0] = 42.0;
    assert!(!alias.shares_storage(&buffer));
    assert_eq!(buffer.pixel(0, 0).unwrap()[0], 0.0);
    assert_eq!(alias.pixel(0, 0).unwrap()[0], 42.0);
}

// ── Processing ─────────────────────────────────────────────────

#[test]
fn process_mixes_buffer_procedural_and_constant() {
    let image = Buffer::filled(4, 4, ChannelLayout::Vector3, &[0.5, 0.5, 0.5]);
    let ramp = Buffer::procedural(4, 4, ChannelLayout::Value, |x, _y, out| out[0] = x);
    let inputs = [
        ProcessInput::buffer(&image, ChannelLayout::Rgba),
        ProcessInput::buffer(&ramp, ChannelLayout::Value),
        ProcessInput::constant(&[2.0], ChannelLayout::Value),
    ];

    let out = process_pixels(ChannelLayout::Rgba, 4, 4, &inputs, |px, ins| {
        for c in 0..3 {
            px[c] = ins[0][c] * ins[2][0] + ins[1][0];
        }
        px[3] = ins[0][3];
    });

    // Pixel (2, 2) is the center, where the normalized ramp is zero.
    assert_eq!(out.pixel(2, 2).unwrap(), &[1.0, 1.0, 1.0, 1.0]);
    assert_eq!(out.pixel(0, 2).unwrap()[0], 0.0);
}
