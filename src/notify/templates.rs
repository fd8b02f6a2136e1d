// Embedded HTML templates for transactional mail
//
// Names end in .html so tera autoescapes every variable.

use tera::Tera;

use crate::core::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    DonationReceipt,
    VolunteerReceived,
    VolunteerDecision,
    NewsletterWelcome,
    StoryReceived,
}

impl EmailTemplate {
    pub const ALL: &'static [EmailTemplate] = &[
        EmailTemplate::DonationReceipt,
        EmailTemplate::VolunteerReceived,
        EmailTemplate::VolunteerDecision,
        EmailTemplate::NewsletterWelcome,
        EmailTemplate::StoryReceived,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EmailTemplate::DonationReceipt => "donation_receipt.html",
            EmailTemplate::VolunteerReceived => "volunteer_received.html",
            EmailTemplate::VolunteerDecision => "volunteer_decision.html",
            EmailTemplate::NewsletterWelcome => "newsletter_welcome.html",
            EmailTemplate::StoryReceived => "story_received.html",
        }
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        self.name().trim_end_matches(".html")
    }

    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::DonationReceipt => "Thank you for your donation",
            EmailTemplate::VolunteerReceived => "We received your volunteer application",
            EmailTemplate::VolunteerDecision => "Update on your volunteer application",
            EmailTemplate::NewsletterWelcome => "Welcome to the Gifted Giving newsletter",
            EmailTemplate::StoryReceived => "Thank you for sharing your story",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            EmailTemplate::DonationReceipt => DONATION_RECEIPT,
            EmailTemplate::VolunteerReceived => VOLUNTEER_RECEIVED,
            EmailTemplate::VolunteerDecision => VOLUNTEER_DECISION,
            EmailTemplate::NewsletterWelcome => NEWSLETTER_WELCOME,
            EmailTemplate::StoryReceived => STORY_RECEIVED,
        }
    }
}

pub fn load() -> Result<Tera, AppError> {
    let mut tera = Tera::default();
    tera.add_raw_template("layout.html", LAYOUT)
        .map_err(|e| AppError::ConfigurationError(format!("Invalid email layout: {}", e)))?;
    for template in EmailTemplate::ALL {
        tera.add_raw_template(template.name(), template.source())
            .map_err(|e| {
                AppError::ConfigurationError(format!("Invalid email template {}: {}", template.name(), e))
            })?;
    }
    Ok(tera)
}

const LAYOUT: &str = r#"<!DOCTYPE html>
<html>
  <body style="font-family: Arial, sans-serif; color: #333; max-width: 600px; margin: 0 auto;">
    <div style="background: #2e7d32; color: #fff; padding: 20px; text-align: center;">
      <h1 style="margin: 0;">Gifted Giving</h1>
    </div>
    <div style="padding: 20px;">
      {% block content %}{% endblock content %}
    </div>
    <div style="padding: 20px; font-size: 12px; color: #777; text-align: center;">
      {% block footer %}<a href="{{ client_url | safe }}">{{ client_url | safe }}</a>{% endblock footer %}
    </div>
  </body>
</html>
"#;

const DONATION_RECEIPT: &str = r#"{% extends "layout.html" %}
{% block content %}
<p>Dear {{ donor_name }},</p>
<p>Thank you for your {{ frequency }} donation of <strong>{{ amount }}</strong>{% if program_title %} to <strong>{{ program_title }}</strong>{% endif %}.</p>
<table style="border-collapse: collapse;">
  <tr><td style="padding: 4px 12px 4px 0;">Receipt number</td><td>{{ donation_id }}</td></tr>
  <tr><td style="padding: 4px 12px 4px 0;">Date</td><td>{{ date }}</td></tr>
  <tr><td style="padding: 4px 12px 4px 0;">Payment method</td><td>{{ payment_method }}</td></tr>
</table>
{% if dedication %}<p>Dedicated: {{ dedication }}</p>{% endif %}
<p>Please keep this email for your records.</p>
{% endblock content %}
"#;

const VOLUNTEER_RECEIVED: &str = r#"{% extends "layout.html" %}
{% block content %}
<p>Hi {{ name }},</p>
<p>Thank you for applying to volunteer with Gifted Giving. Our team reviews every application and will contact you soon.</p>
<p>Availability: {{ availability }}</p>
{% if interests %}<p>Interests: {{ interests | join(sep=", ") }}</p>{% endif %}
{% endblock content %}
"#;

const VOLUNTEER_DECISION: &str = r#"{% extends "layout.html" %}
{% block content %}
<p>Hi {{ name }},</p>
{% if approved %}
<p>Great news! Your volunteer application has been <strong>approved</strong>. We will be in touch with next steps.</p>
{% else %}
<p>Thank you for your interest. Unfortunately we are unable to accept your volunteer application at this time.</p>
{% endif %}
{% if notes %}<p>{{ notes }}</p>{% endif %}
{% endblock content %}
"#;

const NEWSLETTER_WELCOME: &str = r#"{% extends "layout.html" %}
{% block content %}
<p>Hi{% if name %} {{ name }}{% endif %},</p>
<p>Thanks for subscribing to the Gifted Giving newsletter. You will hear about new programs and the impact of your community.</p>
{% endblock content %}
{% block footer %}
<a href="{{ unsubscribe_url | safe }}">Unsubscribe</a>
{% endblock footer %}
"#;

const STORY_RECEIVED: &str = r#"{% extends "layout.html" %}
{% block content %}
<p>Hi {{ author_name }},</p>
<p>Thank you for sharing "{{ title }}". Our team will review your story before it is published.</p>
{% endblock content %}
"#;
