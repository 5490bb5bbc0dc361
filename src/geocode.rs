use serde::Deserialize;

/// Nominatim-style reverse geocoding response; only the label is used.
#[derive(Debug, Deserialize)]
struct ReverseGeocodeResponse {
    #[serde(default)]
    display_name: Option<String>,
}

/// Resolve coordinates to a human-readable address. Any failure degrades to
/// `None`; a missing address never fails an upload.
pub async fn reverse_geocode(
    client: &reqwest::Client,
    base_url: Option<&str>,
    latitude: f64,
    longitude: f64,
) -> Option<String> {
    let base_url = base_url?;

    let resp = match client
        .get(base_url)
        .query(&[
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("format", "json".to_string()),
        ])
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(error = %e, "Reverse geocoding request failed");
            return None;
        }
    };

    if !resp.status().is_success() {
        tracing::warn!(status = %resp.status(), "Reverse geocoding returned an error");
        return None;
    }

    match resp.json::<ReverseGeocodeResponse>().await {
        Ok(body) => body.display_name.filter(|s| !s.trim().is_empty()),
        Err(e) => {
            tracing::warn!(error = %e, "Reverse geocoding response was not understood");
            None
        }
    }
}
