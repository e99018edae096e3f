use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{CartItemDto, CartList},
        locations::{CreateLocationRequest, LocationList},
        orders::{
            OrderDetail, OrderLineDto, OrderLineRequest, OrderList, PlaceOrderRequest,
            UpdateOrderStatusRequest,
        },
        products::{CreateProductRequest, InventoryAdjustRequest, ProductList, UpdateProductRequest},
    },
    models::{CartItem, Location, Order, OrderProduct, Product, User},
    response::{ApiResponse, Meta},
    routes::{auth, cart, health, locations, orders, params, products, vendor},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        auth::verify,
        cart::cart_list,
        cart::add_to_cart,
        cart::remove_from_cart,
        locations::list_locations,
        locations::create_location,
        locations::delete_location,
        products::list_products,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product,
        orders::place_order,
        orders::list_orders,
        orders::get_order,
        orders::delete_order,
        vendor::list_vendor_orders,
        vendor::update_order_status,
        vendor::list_low_stock,
        vendor::adjust_inventory
    ),
    components(
        schemas(
            User,
            Location,
            Product,
            CartItem,
            Order,
            OrderProduct,
            CartList,
            CartItemDto,
            LocationList,
            CreateLocationRequest,
            PlaceOrderRequest,
            OrderLineRequest,
            OrderLineDto,
            OrderDetail,
            OrderList,
            UpdateOrderStatusRequest,
            CreateProductRequest,
            UpdateProductRequest,
            InventoryAdjustRequest,
            ProductList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::LowStockQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderDetail>,
            ApiResponse<OrderList>,
            ApiResponse<LocationList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Locations", description = "Delivery location endpoints"),
        (name = "Orders", description = "Order placement and history"),
        (name = "Vendor", description = "Vendor-side order and inventory endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
