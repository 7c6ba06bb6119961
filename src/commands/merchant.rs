use crate::args::{MerchantArgs, MerchantSaveArgs};
use crate::commands::Out;
use crate::merchant::MerchantLookup;
use crate::model::{MerchantMemoryEntry, UserId};
use crate::{Config, Result};

pub async fn merchant_save(
    config: Config,
    args: MerchantSaveArgs,
) -> Result<Out<MerchantMemoryEntry>> {
    let user = UserId::new(args.user())?;
    let entry = config
        .tracker()
        .merchants()
        .save(&user, args.merchant(), args.category(), args.expense_type())
        .await?;
    Ok(Out::new(
        format!(
            "Merchant '{}' saved with category '{}' ({})",
            args.merchant().trim(),
            entry.category,
            entry.r#type
        ),
        entry,
    ))
}

pub async fn merchant_lookup(config: Config, args: MerchantArgs) -> Result<Out<MerchantLookup>> {
    let user = UserId::new(args.user())?;
    let lookup = config
        .tracker()
        .merchants()
        .lookup(&user, args.merchant())
        .await?;
    let message = match (&lookup.category, &lookup.r#type) {
        (Some(category), Some(t)) => {
            format!("Merchant '{}' is remembered as '{category}' ({t})", lookup.merchant)
        }
        _ => format!("Merchant '{}' has not been saved", lookup.merchant),
    };
    Ok(Out::new(message, lookup))
}
