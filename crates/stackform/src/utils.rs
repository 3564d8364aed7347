//! Utilities for working with `stackform`.

/// Returns the base64 encoded sha256 digest of the file at the given path.
///
/// This is the form Lambda uses for `CodeSha256`, so it can be compared with
/// what the platform reports.
pub fn sha256_base64(path: impl AsRef<std::path::Path>) -> std::io::Result<String> {
    log::trace!("determining sha256 of {}", path.as_ref().display());

    fn sha256<R: std::io::Read>(mut reader: R) -> std::io::Result<ring::digest::Digest> {
        let mut context = ring::digest::Context::new(&ring::digest::SHA256);
        let mut buffer = [0; 1024];

        loop {
            let count = reader.read(&mut buffer)?;
            if count == 0 {
                break;
            }
            context.update(&buffer[..count]);
        }

        Ok(context.finish())
    }

    let input = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(input);
    let digest = sha256(reader)?;
    Ok(data_encoding::BASE64.encode(digest.as_ref()))
}
