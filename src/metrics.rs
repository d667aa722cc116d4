use std::sync::LazyLock;

use prometheus::*;

static METRIC_PROVIDER_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "visionrag_provider_duration",
        "duration of the successful provider request in seconds",
        &["provider"]
    )
    .unwrap()
});

static METRIC_PROVIDER_FAILURE: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "visionrag_provider_failure",
        "count of the failed provider request",
        &["provider"]
    )
    .unwrap()
});

static METRIC_EMBED_IMAGE_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "visionrag_embed_image_count",
        "count of the embedded image",
        &["size", "source"]
    )
    .unwrap()
});

pub fn observe_provider_duration(provider: &str, seconds: f64) {
    METRIC_PROVIDER_DURATION.with_label_values(&[provider]).observe(seconds);
}

pub fn inc_provider_failure(provider: &str) {
    METRIC_PROVIDER_FAILURE.with_label_values(&[provider]).inc();
}

/// 增加嵌入图片计数，`source` 为 `image` 或 `pdf`
pub fn inc_embed_image_count(size: (u32, u32), source: &str) {
    METRIC_EMBED_IMAGE_COUNT.with_label_values(&[to_fixed_size(size), source]).inc();
}

/// 以 prometheus 文本格式导出所有指标
pub fn render() -> String {
    TextEncoder::new().encode_to_string(&prometheus::gather()).unwrap_or_default()
}

/// 将图像面积范围调整到几个固定值
fn to_fixed_size((width, height): (u32, u32)) -> &'static str {
    let area = width as u64 * height as u64;
    if area <= 256 * 256 {
        "256"
    } else if area <= 512 * 512 {
        "512"
    } else if area <= 1024 * 1024 {
        "1024"
    } else if area <= 1568 * 1568 {
        "1568"
    } else {
        "1568+"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_buckets() {
        assert_eq!(to_fixed_size((100, 100)), "256");
        assert_eq!(to_fixed_size((1920, 1280)), "1568");
        assert_eq!(to_fixed_size((3000, 2000)), "1568+");
    }

    #[test]
    fn rendered_text_contains_counters() {
        inc_provider_failure("test-provider");
        assert!(render().contains("visionrag_provider_failure"));
    }
}
