use anyhow::Context;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::config::Config;

const SENDER_NAME: &str = "Nursery Booking";

pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from_addr = config.smtp_from.as_deref()?;

        let port = config.smtp_port.unwrap_or(587);
        let creds = Credentials::new(username, password);

        let transport = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .ok()?
                .port(port)
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .ok()?
                .port(port)
                .credentials(creds)
                .build()
        };

        let from: Mailbox = from_addr.parse().ok()?;

        Some(Self { transport, from })
    }

    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    fn wrap_html(content: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width,initial-scale=1">
  <title>{SENDER_NAME}</title>
</head>
<body style="margin:0;padding:0;background-color:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Helvetica,Arial,sans-serif">
  <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="background-color:#f1f5f9;padding:40px 16px">
    <tr>
      <td align="center">
        <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="max-width:520px">
          <tr>
            <td style="background:#ffffff;border-radius:12px;padding:40px">
              {content}
            </td>
          </tr>
          <tr>
            <td align="center" style="padding-top:20px">
              <p style="margin:0;font-size:12px;color:#94a3b8">{SENDER_NAME}</p>
            </td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>"#
        )
    }

    async fn send_email(&self, to: Mailbox, subject: &str, text: &str, html: &str) -> anyhow::Result<()> {
        let from = Mailbox::new(Some(SENDER_NAME.to_string()), self.from.email.clone());
        let email = Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;

        Ok(())
    }

    pub async fn send_password_reset(
        &self,
        to_email: &str,
        to_name: &str,
        reset_url: &str,
    ) -> anyhow::Result<()> {
        let to: Mailbox = match format!("{to_name} <{to_email}>").parse() {
            Ok(mailbox) => mailbox,
            Err(_) => to_email.parse().context("Invalid recipient address")?,
        };

        let subject = "Your password reset token (valid for 10 min)";

        let text = format!(
            "Hi {to_name},\n\n\
            Forgot your password? Submit a PATCH request with your new password and \
            passwordConfirm to:\n\
            {reset_url}\n\n\
            If you didn't forget your password, please ignore this email."
        );

        let content = format!(
            r#"<h1 style="margin:0 0 8px 0;font-size:22px;font-weight:700;color:#0f172a">Reset your password</h1>
<p style="margin:0 0 28px 0;font-size:15px;color:#64748b;line-height:1.6">Hi <strong style="color:#334155">{to_name}</strong>,<br><br>Forgot your password? Use the link below to choose a new one.</p>
<p style="margin:0 0 28px 0;font-size:14px;word-break:break-all"><a href="{reset_url}" style="color:#2563eb">{reset_url}</a></p>
<p style="margin:0;font-size:13px;color:#94a3b8;border-top:1px solid #f1f5f9;padding-top:20px;line-height:1.5">This link expires in <strong style="color:#64748b">10 minutes</strong>. If you didn't forget your password, please ignore this email.</p>"#
        );

        let html = Self::wrap_html(&content);
        self.send_email(to, subject, &text, &html).await
    }
}

/// Where the reset link in the email points.
pub fn reset_url(base_url: &str, token: &str) -> String {
    format!(
        "{}/api/v1/users/resetPassword?token={token}",
        base_url.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_url_joins_base_without_double_slash() {
        assert_eq!(
            reset_url("http://localhost:3000/", "abc"),
            "http://localhost:3000/api/v1/users/resetPassword?token=abc"
        );
    }
}
