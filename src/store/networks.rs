use ipnetwork::IpNetwork;
use uuid::Uuid;

use super::models::VirtualNetwork;
use super::Store;

impl Store {
    pub async fn get_virtual_network(
        &self,
        id: Uuid,
    ) -> Result<Option<VirtualNetwork>, sqlx::Error> {
        sqlx::query_as::<_, VirtualNetwork>(
            "SELECT id, org_id, cidr, gateway_ip, dns_servers FROM virtual_networks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn create_virtual_network(
        &self,
        org_id: Uuid,
        cidr: IpNetwork,
        gateway_ip: Option<IpNetwork>,
        dns_servers: &[String],
    ) -> Result<VirtualNetwork, sqlx::Error> {
        sqlx::query_as::<_, VirtualNetwork>(
            "INSERT INTO virtual_networks (id, org_id, cidr, gateway_ip, dns_servers)
             VALUES (gen_random_uuid(), $1, $2, $3, $4)
             RETURNING id, org_id, cidr, gateway_ip, dns_servers",
        )
        .bind(org_id)
        .bind(cidr)
        .bind(gateway_ip)
        .bind(dns_servers)
        .fetch_one(&self.pool)
        .await
    }
}
