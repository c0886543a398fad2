//! Prometheus gauges populated by every driver refresh
//!
//! The registry is process-wide and shared through the driver context;
//! serving the text exposition is left to the embedding application.

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

const CHANNEL_LABELS: [&str; 11] = [
    "serial",
    "channelId",
    "name",
    "description",
    "profile",
    "label",
    "rgb",
    "aio",
    "pump",
    "probe",
    "led",
];

/// One channel's reading plus its labels.
#[derive(Debug, Clone, Default)]
pub struct ChannelSample<'a> {
    pub serial: &'a str,
    pub channel_id: i32,
    pub name: &'a str,
    pub description: &'a str,
    pub profile: &'a str,
    pub label: &'a str,
    pub rgb: &'a str,
    pub aio: bool,
    pub pump: bool,
    pub probe: bool,
    pub led: bool,
    pub temperature: f64,
    pub rpm: f64,
}

/// Gauges exposed per device and per channel.
pub struct Metrics {
    registry: Registry,
    temperature: GaugeVec,
    speed: GaugeVec,
    device: GaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let temperature = GaugeVec::new(
            Opts::new("openlinkhub_temperature", "Channel temperature in Celsius"),
            &CHANNEL_LABELS,
        )?;
        let speed = GaugeVec::new(
            Opts::new("openlinkhub_speed", "Channel speed in RPM"),
            &CHANNEL_LABELS,
        )?;
        let device = GaugeVec::new(
            Opts::new("openlinkhub", "Connected device"),
            &["product", "serial", "firmware"],
        )?;

        registry.register(Box::new(temperature.clone()))?;
        registry.register(Box::new(speed.clone()))?;
        registry.register(Box::new(device.clone()))?;

        Ok(Self {
            registry,
            temperature,
            speed,
            device,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mark a device present.
    pub fn record_device(&self, product: &str, serial: &str, firmware: &str) {
        self.device
            .with_label_values(&[product, serial, firmware])
            .set(1.0);
    }

    /// Set temperature and speed gauges for one channel.
    pub fn record_channel(&self, sample: &ChannelSample<'_>) {
        let id = sample.channel_id.to_string();
        let flag = |b: bool| if b { "1" } else { "0" };
        let labels = [
            sample.serial,
            id.as_str(),
            sample.name,
            sample.description,
            sample.profile,
            sample.label,
            sample.rgb,
            flag(sample.aio),
            flag(sample.pump),
            flag(sample.probe),
            flag(sample.led),
        ];
        self.temperature
            .with_label_values(&labels)
            .set(sample.temperature);
        self.speed.with_label_values(&labels).set(sample.rpm);
    }

    /// Text exposition of every registered gauge.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauges_render() {
        let m = Metrics::new().unwrap();
        m.record_device("iCUE LINK System Hub", "ABC", "2.4.438");
        m.record_channel(&ChannelSample {
            serial: "ABC",
            channel_id: 1,
            name: "QX Fan",
            description: "Fan",
            profile: "Normal",
            label: "Not Set",
            rgb: "static",
            temperature: 31.5,
            rpm: 1200.0,
            ..Default::default()
        });
        let text = m.encode().unwrap();
        assert!(text.contains("openlinkhub_temperature"));
        assert!(text.contains("openlinkhub_speed"));
        assert!(text.contains(r#"firmware="2.4.438""#));
        assert!(text.contains("1200"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_device("p", "s", "f");
        assert!(!b.encode().unwrap().contains(r#"serial="s""#));
    }
}
