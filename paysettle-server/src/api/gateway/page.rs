//! Minimal HTML pages shown to the buyer.

use html_escape::{encode_double_quoted_attribute, encode_text};
use paysettle_sdk::objects::PaymentRedirect;

fn layout(title: &str, body: &str, onload: Option<&str>) -> String {
    let onload = onload
        .map(|js| format!(" onload=\"{}\"", encode_double_quoted_attribute(js)))
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n</head>\n<body{onload}>\n{body}\n</body>\n</html>\n",
        encode_text(title)
    )
}

pub(super) fn message_page(title: &str, message: &str) -> String {
    let body = format!(
        "<h1>{}</h1>\n<p>{}</p>",
        encode_text(title),
        encode_text(message)
    );
    layout(title, &body, None)
}

/// A form that posts every field to the gateway as soon as it loads, with a
/// button for browsers that block the script.
pub(super) fn redirect_page(redirect: &PaymentRedirect) -> String {
    let inputs: String = redirect
        .form_fields
        .iter()
        .map(|(name, value)| {
            format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\">\n",
                encode_double_quoted_attribute(name),
                encode_double_quoted_attribute(value)
            )
        })
        .collect();
    let body = format!(
        "<form id=\"gateway\" action=\"{}\" method=\"post\">\n{inputs}\
         <noscript><p>Continue to the payment page to complete your order.</p></noscript>\n\
         <button type=\"submit\">Pay now</button>\n</form>",
        encode_double_quoted_attribute(&redirect.action_url)
    );
    layout(
        "Redirecting to payment",
        &body,
        Some("document.getElementById('gateway').submit()"),
    )
}
