use anyhow::Result;
use image::RgbImage;
use ndarray::Array4;

/// Packs an RGB image into a `[1, 3, H, W]` tensor in BGR channel order with
/// raw `[0, 255]` values, which is what both YuNet and SFace consume.
pub fn bgr_planar(img: &RgbImage) -> Result<Array4<f32>> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    let (b, rest) = data.split_at_mut(plane);
    let (g, r) = rest.split_at_mut(plane);
    for (i, px) in img.as_raw().chunks_exact(3).enumerate() {
        r[i] = px[0] as f32;
        g[i] = px[1] as f32;
        b[i] = px[2] as f32;
    }

    Ok(Array4::from_shape_vec(
        (1, 3, height as usize, width as usize),
        data,
    )?)
}
