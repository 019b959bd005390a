//! List commands implementation

use iotprov_core::spec::{DeviceRegistry, ImageFormat};

/// List every known model and its segments
pub fn list_models(registry: &DeviceRegistry) {
    println!("Supported devices:");

    for model in registry.models() {
        println!();
        print!("{} ({})", model.product_name, model.id);
        if let Some(serial) = model.serial {
            print!(", serial {}", serial);
        }
        match model.alternative_protocol {
            Some(alt) => println!(", {} (also {})", model.default_protocol, alt),
            None => println!(", {}", model.default_protocol),
        }

        println!(
            "  {:<22} {:>3} {:>12} {:>10} {:>6}",
            "Segment", "Alt", "Address", "Size", "Key"
        );
        println!("  {}", "-".repeat(57));
        for segment in &model.segments {
            let size = segment.size.map(format_size).unwrap_or_default();
            let key = match segment.format {
                ImageFormat::Der => segment.alg.as_str(),
                ImageFormat::None => "",
            };
            println!(
                "  {:<22} {:>3} {:>#12x} {:>10} {:>6}",
                segment.name, segment.alt, segment.address, size, key
            );
        }
    }
}

fn format_size(bytes: u32) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
