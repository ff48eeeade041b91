use crate::config::MAX_PHOTOS;
use crate::convert::models::{GroupedProducts, SourceRow, Variant};
use tracing::warn;

/// Folds flat export rows into one aggregate per handle.
///
/// Product-level fields come from the first titled row of a handle, images
/// are deduplicated and capped at `MAX_PHOTOS`, and every row with a SKU or a
/// price becomes a variant. Unparseable quantities and prices read as zero.
pub fn group_rows<I>(rows: I) -> GroupedProducts
where
    I: IntoIterator<Item = SourceRow>,
{
    let mut grouped = GroupedProducts::default();

    for (line, row) in rows.into_iter().enumerate() {
        let handle = row.handle.trim();
        if handle.is_empty() {
            warn!(target = "forge.convert", line = line + 1, "row_without_handle_skipped");
            continue;
        }
        let product = grouped.entry(handle);

        if !row.title.trim().is_empty() && product.title.is_empty() {
            product.title = row.title.trim().to_string();
            product.description = row.body_html.clone();
            product.tags = row.tags.clone();
            product.vendor = row.vendor.clone();
            product.product_type = row.product_type.clone();
        }

        let image = row.image_src.trim();
        if !image.is_empty()
            && product.images.len() < MAX_PHOTOS
            && !product.images.iter().any(|known| known == image)
        {
            product.images.push(image.to_string());
        }

        let quantity = parse_quantity(&row.variant_quantity, handle, line);
        product.total_quantity += u64::from(quantity);

        let has_sku = !row.variant_sku.trim().is_empty();
        let has_price = !row.variant_price.trim().is_empty();
        if has_sku || has_price {
            let price = parse_price(&row.variant_price, handle, line);
            if product.base_price == 0.0 && price > 0.0 {
                product.base_price = price;
            }
            product.variants.push(Variant {
                option1_name: row.option1_name.trim().to_string(),
                option1_value: row.option1_value.trim().to_string(),
                option2_name: row.option2_name.trim().to_string(),
                option2_value: row.option2_value.trim().to_string(),
                sku: row.variant_sku.trim().to_string(),
                price,
                image: row.variant_image.trim().to_string(),
                quantity,
            });
        }
    }

    grouped
}

/// Reads an inventory cell as a whole non-negative count. Fractional
/// values truncate; anything else is a recoverable defect worth zero.
pub fn parse_quantity(raw: &str, handle: &str, line: usize) -> u32 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value.trunc().min(u32::MAX as f64) as u32,
        _ => {
            warn!(
                target = "forge.convert",
                handle = %handle,
                line = line + 1,
                value = %trimmed,
                "invalid_quantity_defaulted"
            );
            0
        }
    }
}

fn parse_price(raw: &str, handle: &str, line: usize) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => {
            warn!(
                target = "forge.convert",
                handle = %handle,
                line = line + 1,
                value = %trimmed,
                "invalid_price_defaulted"
            );
            0.0
        }
    }
}
