use arrears_campaigns::ReminderTone;

use crate::ports::{EmailContext, EmailTemplateGenerator, PortError, RenderedEmail};

/// Deterministic plain-text reminders, one template per tone.
#[derive(Debug, Clone, Default)]
pub struct FallbackTemplateGenerator {
    sender_name: String,
}

impl FallbackTemplateGenerator {
    pub fn new(sender_name: impl Into<String>) -> Self {
        Self {
            sender_name: sender_name.into(),
        }
    }

    pub fn render_sync(&self, ctx: &EmailContext) -> RenderedEmail {
        let number = &ctx.invoice_number;
        let balance = &ctx.outstanding_balance;
        let due = ctx.due_date.format("%Y-%m-%d");

        let (subject, opening, closing) = match ctx.tone {
            ReminderTone::Friendly => (
                format!("Friendly reminder: invoice {number} is past due"),
                format!(
                    "Our records show that invoice {number} (due {due}) still has {balance} outstanding. \
                     If you have already paid, please disregard this message."
                ),
                "Thank you for your business.".to_string(),
            ),
            ReminderTone::Firm => (
                format!("Second notice: invoice {number} is {} days overdue", ctx.days_overdue),
                format!(
                    "Invoice {number} is now {} days overdue with {balance} outstanding. \
                     Please arrange payment or contact us to discuss options.",
                    ctx.days_overdue
                ),
                "We appreciate your prompt attention.".to_string(),
            ),
            ReminderTone::Urgent => (
                format!("Urgent: payment required for invoice {number}"),
                format!(
                    "Despite previous reminders, {balance} remains unpaid on invoice {number}. \
                     Please pay within 7 days to avoid further collection action."
                ),
                "Reply to this email if you need a payment plan.".to_string(),
            ),
            ReminderTone::Final => (
                format!("Final notice: invoice {number}"),
                format!(
                    "This is the final notice for invoice {number}. Unless {balance} is paid, \
                     the account will be referred to our collections team."
                ),
                "Contact us immediately to resolve this balance.".to_string(),
            ),
        };

        let signature = if self.sender_name.is_empty() {
            "Accounts Receivable".to_string()
        } else {
            format!("{} Accounts Receivable", self.sender_name)
        };

        RenderedEmail {
            subject,
            body: format!("Hello,\n\n{opening}\n\n{closing}\n\n{signature}\n"),
        }
    }
}

#[async_trait::async_trait]
impl EmailTemplateGenerator for FallbackTemplateGenerator {
    async fn render(&self, context: &EmailContext) -> Result<RenderedEmail, PortError> {
        Ok(self.render_sync(context))
    }
}
