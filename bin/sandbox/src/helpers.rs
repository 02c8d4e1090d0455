use rand::RngCore;

/// Random lowercase hex string of the given length.
pub fn rand_hex(len: usize) -> String {
  let mut bytes = vec![0u8; len.div_ceil(2)];
  rand::rng().fill_bytes(&mut bytes);
  let mut encoded = hex::encode(bytes);
  encoded.truncate(len);
  encoded
}

/// Reduces an image tag to its bare name: drops any `:tag` suffix
/// and keeps the segment after the first `/`.
pub fn strip_image_name(image: &str) -> String {
  let name = match image.find(':') {
    Some(idx) => &image[..idx],
    None => image,
  };
  name.split('/').nth(1).unwrap_or(name).to_string()
}
