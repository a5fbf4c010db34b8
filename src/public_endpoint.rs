/// returns the reference emitted for a stored asset
///
/// With a base url the reference is absolute, otherwise it is the bare path
/// served by the static routes.
pub fn asset_url(base_url: Option<&str>, prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    match base_url {
        Some(base) => format!("{}/{prefix}/{file_name}", base.trim_end_matches('/')),
        None => format!("/{prefix}/{file_name}"),
    }
}

/// extracts the file name from a reference produced by [`asset_url`]
pub fn file_name_from_url<'a>(url: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = format!("/{}/", prefix.trim_matches('/'));
    let start = url.find(&prefix)? + prefix.len();
    let name = &url[start..];
    (!name.is_empty() && !name.contains('/')).then_some(name)
}
