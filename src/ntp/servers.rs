//! Случайные имена серверов из NTP-пула

use rand::Rng;

use crate::config::ServerPoolConfig;

/// Генерирует имена вида `2.us.pool.ntp.org` из публичных зон пула.
///
/// Каждое имя через DNS round-robin указывает на свой набор
/// серверов, так что кворум распределяется по разным провайдерам
/// без зашитого списка серверов.
#[derive(Debug, Clone)]
pub struct ServerPool {
    prefix_count: u32,
    country_codes: Vec<String>,
    domain: String,
}

impl ServerPool {
    pub fn new(config: &ServerPoolConfig) -> Self {
        Self {
            prefix_count: config.prefix_count.max(1),
            country_codes: config.country_codes.clone(),
            domain: config.domain.trim_matches('.').to_string(),
        }
    }

    /// Сколько разных имён может выдать пул
    pub fn size(&self) -> usize {
        self.prefix_count as usize * self.country_codes.len().max(1)
    }

    pub fn pick<R: Rng>(&self, rng: &mut R) -> String {
        let prefix = rng.gen_range(0..self.prefix_count);
        if self.country_codes.is_empty() {
            return format!("{}.{}", prefix, self.domain);
        }
        let country = &self.country_codes[rng.gen_range(0..self.country_codes.len())];
        format!("{}.{}.{}", prefix, country, self.domain)
    }

    /// Имя, отличное от `avoid`, если в пуле больше одного имени
    pub fn pick_excluding<R: Rng>(&self, rng: &mut R, avoid: Option<&str>) -> String {
        loop {
            let name = self.pick(rng);
            match avoid {
                Some(previous) if previous == name && self.size() > 1 => continue,
                _ => return name,
            }
        }
    }
}

impl Default for ServerPool {
    fn default() -> Self {
        Self::new(&ServerPoolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_default_name_shape() {
        let pool = ServerPool::default();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let name = pool.pick(&mut rng);
            let parts: Vec<&str> = name.split('.').collect();
            assert_eq!(parts.len(), 5, "unexpected name {}", name);
            assert!(parts[0].parse::<u32>().unwrap() < 4);
            assert!(parts[1] == "ca" || parts[1] == "us");
            assert_eq!(&parts[2..], &["pool", "ntp", "org"]);
        }
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(ServerPool::default().size(), 8);
    }

    #[test]
    fn test_pick_excluding_never_repeats() {
        let pool = ServerPool::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut previous = pool.pick(&mut rng);

        for _ in 0..100 {
            let next = pool.pick_excluding(&mut rng, Some(&previous));
            assert_ne!(next, previous);
            previous = next;
        }
    }

    #[test]
    fn test_single_name_pool_allows_repeat() {
        let pool = ServerPool::new(&ServerPoolConfig {
            prefix_count: 1,
            country_codes: vec![],
            domain: "time.example.org".to_string(),
        });
        let mut rng = StdRng::seed_from_u64(1);

        let name = pool.pick_excluding(&mut rng, Some("0.time.example.org"));
        assert_eq!(name, "0.time.example.org");
    }
}
